// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer messages, forwarded to `tracing`. Only wired up in
//! debug builds; nothing here can change control flow.

use ash::vk;
use std::borrow::Cow;
use std::ffi::CStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    General,
    Validation,
    Performance,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugMessage<'a> {
    pub severity: Severity,
    pub category: Category,
    pub text: Cow<'a, str>,
}

impl Severity {
    pub fn from_vk(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Severity::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Severity::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Severity::Info
        } else {
            Severity::Verbose
        }
    }
}

impl Category {
    // Validation wins over performance when a message carries both bits.
    pub fn from_vk(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            Category::Validation
        } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            Category::Performance
        } else {
            Category::General
        }
    }
}

impl DebugMessage<'_> {
    pub fn emit(&self) {
        let category = self.category;
        match self.severity {
            Severity::Error => tracing::error!(?category, "{}", self.text),
            Severity::Warning => tracing::warn!(?category, "{}", self.text),
            Severity::Info => tracing::debug!(?category, "{}", self.text),
            Severity::Verbose => tracing::trace!(?category, "{}", self.text),
        }
    }
}

pub(crate) unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or a valid callback struct whose
    // message pointer is null or a NUL-terminated string for this call.
    let text = unsafe {
        match data.as_ref() {
            Some(d) if !d.p_message.is_null() => CStr::from_ptr(d.p_message).to_string_lossy(),
            _ => Cow::Borrowed("<no message>"),
        }
    };
    DebugMessage {
        severity: Severity::from_vk(severity),
        category: Category::from_vk(types),
        text,
    }
    .emit();
    vk::FALSE
}
