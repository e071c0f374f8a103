// SPDX-License-Identifier: CEPL-1.0
//! Mip chain sizing and the ordered command plan used to upload a texture
//! and generate its mips with blits inside one command buffer.

use anyhow::Result;
use ash::vk;
use tracing::warn;

/// `floor(log2(max(w, h))) + 1`; zero extents count as one level.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Exactly `levels` extents, each half the previous one, never below 1.
pub fn mip_chain(width: u32, height: u32, levels: u32) -> Vec<vk::Extent2D> {
    let mut extent = vk::Extent2D {
        width: width.max(1),
        height: height.max(1),
    };
    let mut chain = Vec::with_capacity(levels as usize);
    for _ in 0..levels {
        chain.push(extent);
        extent = vk::Extent2D {
            width: (extent.width / 2).max(1),
            height: (extent.height / 2).max(1),
        };
    }
    chain
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureStep {
    Transition {
        base_level: u32,
        level_count: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    CopyToBaseLevel,
    Blit {
        src_level: u32,
        src: vk::Extent2D,
        dst: vk::Extent2D,
    },
}

/// Every level starts in `TRANSFER_DST`; each finished source level moves
/// to `SHADER_READ_ONLY` right after its blit, the last one after the loop.
pub fn texture_plan(width: u32, height: u32, levels: u32) -> Vec<TextureStep> {
    let levels = levels.max(1);
    let chain = mip_chain(width, height, levels);
    let mut steps = vec![
        TextureStep::Transition {
            base_level: 0,
            level_count: levels,
            old: vk::ImageLayout::UNDEFINED,
            new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        },
        TextureStep::CopyToBaseLevel,
    ];
    for level in 1..levels {
        let src_level = level - 1;
        steps.push(TextureStep::Transition {
            base_level: src_level,
            level_count: 1,
            old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        });
        steps.push(TextureStep::Blit {
            src_level,
            src: chain[src_level as usize],
            dst: chain[level as usize],
        });
        steps.push(TextureStep::Transition {
            base_level: src_level,
            level_count: 1,
            old: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
    }
    steps.push(TextureStep::Transition {
        base_level: levels - 1,
        level_count: 1,
        old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    });
    steps
}

/// Levels actually built for a texture. Without linear blit support for
/// the format the chain cannot be generated, so only the base level exists.
pub fn upload_levels(requested: u32, linear_blit: bool) -> u32 {
    let requested = requested.max(1);
    if requested > 1 && !linear_blit {
        warn!(
            requested,
            "linear blit unsupported; texture keeps a single mip level"
        );
        return 1;
    }
    requested
}

/// Where a texture upload is recorded. The Vulkan implementation writes
/// into a one-time command buffer.
pub trait TextureSink {
    type Texture;

    fn record(&mut self, step: TextureStep);
    /// Submit everything recorded and block until the GPU has finished.
    fn submit_and_wait(&mut self) -> Result<()>;
    /// Produce the sampleable texture. Only reached after the wait.
    fn hand_out(self, levels: u32) -> Result<Self::Texture>;
}

/// Record the plan for `levels` levels, wait for it, then hand the texture
/// out. Nothing can sample the result before the copy and blits finish.
pub fn upload_texture_levels<S: TextureSink>(
    mut sink: S,
    width: u32,
    height: u32,
    levels: u32,
) -> Result<S::Texture> {
    let levels = levels.max(1);
    for step in texture_plan(width, height, levels) {
        sink.record(step);
    }
    sink.submit_and_wait()?;
    sink.hand_out(levels)
}

/// Access mask and pipeline stage that go with an image layout on either
/// side of a barrier.
pub fn layout_access(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        _ => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
    }
}
