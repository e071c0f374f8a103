// SPDX-License-Identifier: CEPL-1.0
use std::error::Error as StdError;
use std::fmt;

/// Coarse classification of unrecoverable failures. Each class exits the
/// process with its own status so scripts can tell them apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// No usable physical device, queue family or required extension.
    Device,
    /// A shader binary could not be opened or parsed.
    Shader,
    /// Any other unexpected non-success result from the GPU API.
    Gpu,
    /// Scene or texture failed to load; the run loop is never entered.
    Scene,
    /// Window or event loop creation failed.
    Window,
    /// Configuration could not be applied.
    Config,
}

impl FailureClass {
    pub const fn exit_code(self) -> u8 {
        match self {
            FailureClass::Device => 2,
            FailureClass::Shader => 3,
            FailureClass::Gpu => 4,
            FailureClass::Scene => 5,
            FailureClass::Window => 6,
            FailureClass::Config => 7,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::Device => "device",
            FailureClass::Shader => "shader",
            FailureClass::Gpu => "gpu",
            FailureClass::Scene => "scene",
            FailureClass::Window => "window",
            FailureClass::Config => "config",
        };
        f.write_str(s)
    }
}

/// Walk the error chain and return the first class `probe` recognises.
/// Unrecognised chains are treated as GPU failures.
pub fn classify<F>(err: &anyhow::Error, probe: F) -> FailureClass
where
    F: Fn(&(dyn StdError + 'static)) -> Option<FailureClass>,
{
    err.chain().find_map(probe).unwrap_or(FailureClass::Gpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Missing;

    impl fmt::Display for Missing {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("missing")
        }
    }

    impl StdError for Missing {}

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let all = [
            FailureClass::Device,
            FailureClass::Shader,
            FailureClass::Gpu,
            FailureClass::Scene,
            FailureClass::Window,
            FailureClass::Config,
        ];
        let mut codes: Vec<u8> = all.iter().map(|c| c.exit_code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn classify_finds_wrapped_source() {
        let err = anyhow::Error::new(Missing).context("loading shaders");
        let class = classify(&err, |e| e.downcast_ref::<Missing>().map(|_| FailureClass::Shader));
        assert_eq!(class, FailureClass::Shader);
    }

    #[test]
    fn classify_defaults_to_gpu() {
        let err = anyhow::anyhow!("queue_submit: ERROR_DEVICE_LOST");
        assert_eq!(classify(&err, |_| None), FailureClass::Gpu);
    }
}
