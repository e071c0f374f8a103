// SPDX-License-Identifier: CEPL-1.0
use super::*;
use crate::swapchain::{choose_extent, choose_image_count, create_per_image};
use ash::vk;
use lumen_math::Vec3;
use lumen_render::{DrawNode, FrameView, Material, Mesh, TextureData, Vertex};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Wait(usize),
    Acquire(usize),
    ReplaceSemaphore(usize),
    Recreate(RenderSize),
    Uniforms(usize),
    Begin(usize),
    BeginPass(PassKind, ClearValues),
    Viewport(Viewport),
    DepthBias(DepthBias),
    BindPipeline(PassKind),
    BindGeometry,
    BindFrameSet(PassKind),
    BindMaterial(usize),
    Push(PassKind, PushConstants),
    Draw {
        pass: PassKind,
        index_count: u32,
        first_index: u32,
    },
    Overlay,
    EndPass,
    End(usize),
    Submit(usize, u32),
    Present(usize, u32),
}

/// Stand-in for the Vulkan backend. Fences are modelled as an in-flight
/// flag per slot: `submit` raises it, `wait_for_slot` retires it, and
/// `begin_recording` refuses to touch a slot that is still in flight.
struct MockBackend {
    caps: vk::SurfaceCapabilitiesKHR,
    extent: RenderSize,
    resident: Resident,
    image_count: u32,
    framebuffers: Vec<u32>,
    next_image: u32,
    in_flight: Vec<bool>,
    semaphore_generation: Vec<u32>,
    acquire_script: VecDeque<Acquire>,
    present_script: VecDeque<Present>,
    recording: Option<PassKind>,
    recreations: u32,
    events: Vec<Event>,
}

impl MockBackend {
    fn new(slots: usize, size: RenderSize) -> Self {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 4,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let mut backend = Self {
            caps,
            extent: RenderSize::default(),
            // Everything counts as uploaded unless a test narrows it.
            resident: Resident {
                indices: u64::MAX,
                materials: usize::MAX,
            },
            image_count: 0,
            framebuffers: Vec::new(),
            next_image: 0,
            in_flight: vec![false; slots],
            semaphore_generation: vec![0; slots],
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            recording: None,
            recreations: 0,
            events: Vec::new(),
        };
        assert!(backend.build_chain(size));
        backend
    }

    fn build_chain(&mut self, size: RenderSize) -> bool {
        let Some(extent) = choose_extent(&self.caps, size) else {
            return false;
        };
        self.extent = RenderSize::new(extent.width, extent.height);
        self.image_count = choose_image_count(&self.caps);
        let images: Vec<u32> = (0..self.image_count).collect();
        self.framebuffers = create_per_image(&images, |&i| Ok(i), |_| {}).unwrap();
        self.next_image = 0;
        true
    }

    /// Surface reported by the window system from now on, as if the user
    /// minimised (0x0) or restored the window behind the renderer's back.
    fn surface_reports(&mut self, extent: vk::Extent2D) {
        self.caps.current_extent = extent;
        self.caps.min_image_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
    }

    fn draws(&self, pass: PassKind) -> Vec<(u32, u32)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                Event::Draw {
                    pass: p,
                    index_count,
                    first_index,
                } if p == pass => Some((index_count, first_index)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(*e)).count()
    }
}

impl FrameBackend for MockBackend {
    fn extent(&self) -> RenderSize {
        self.extent
    }

    fn shadow_extent(&self) -> RenderSize {
        RenderSize::new(1024, 1024)
    }

    fn resident(&self) -> Resident {
        self.resident
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.in_flight[slot] = false;
        self.events.push(Event::Wait(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire> {
        self.events.push(Event::Acquire(slot));
        Ok(self.acquire_script.pop_front().unwrap_or_else(|| {
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Acquire::Ready {
                image_index,
                suboptimal: false,
            }
        }))
    }

    fn replace_image_available(&mut self, slot: usize) -> Result<()> {
        self.semaphore_generation[slot] += 1;
        self.events.push(Event::ReplaceSemaphore(slot));
        Ok(())
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<bool> {
        assert!(!size.is_empty(), "recreated against a zero-sized window");
        if !self.build_chain(size) {
            return Ok(false);
        }
        self.recreations += 1;
        self.events.push(Event::Recreate(size));
        Ok(true)
    }

    fn write_uniforms(&mut self, slot: usize, _uniforms: &FrameUniforms) -> Result<()> {
        assert!(!self.in_flight[slot], "uniforms of slot {slot} written while in flight");
        self.events.push(Event::Uniforms(slot));
        Ok(())
    }

    fn begin_recording(&mut self, slot: usize) -> Result<()> {
        assert!(!self.in_flight[slot], "slot {slot} recorded while in flight");
        self.events.push(Event::Begin(slot));
        Ok(())
    }

    fn begin_pass(&mut self, _slot: usize, pass: PassKind, image_index: u32, clear: &ClearValues) {
        assert!(self.recording.is_none());
        if pass == PassKind::Main {
            assert!((image_index as usize) < self.framebuffers.len());
        }
        self.recording = Some(pass);
        self.events.push(Event::BeginPass(pass, *clear));
    }

    fn set_viewport(&mut self, _slot: usize, viewport: &Viewport, _scissor: RenderSize) {
        self.events.push(Event::Viewport(*viewport));
    }

    fn set_depth_bias(&mut self, _slot: usize, bias: DepthBias) {
        self.events.push(Event::DepthBias(bias));
    }

    fn bind_pipeline(&mut self, _slot: usize, pass: PassKind) {
        self.events.push(Event::BindPipeline(pass));
    }

    fn bind_geometry(&mut self, _slot: usize) {
        self.events.push(Event::BindGeometry);
    }

    fn bind_frame_set(&mut self, _slot: usize, pass: PassKind) {
        self.events.push(Event::BindFrameSet(pass));
    }

    fn bind_material(&mut self, _slot: usize, material: usize) {
        self.events.push(Event::BindMaterial(material));
    }

    fn push_constants(&mut self, _slot: usize, pass: PassKind, constants: &PushConstants) {
        self.events.push(Event::Push(pass, *constants));
    }

    fn draw_indexed(&mut self, _slot: usize, index_count: u32, first_index: u32) {
        let pass = self.recording.expect("draw outside a render pass");
        self.events.push(Event::Draw {
            pass,
            index_count,
            first_index,
        });
    }

    fn record_overlay(&mut self, _slot: usize) -> Result<()> {
        assert_eq!(self.recording, Some(PassKind::Main));
        self.events.push(Event::Overlay);
        Ok(())
    }

    fn end_pass(&mut self, _slot: usize) {
        assert!(self.recording.take().is_some());
        self.events.push(Event::EndPass);
    }

    fn end_recording(&mut self, slot: usize) -> Result<()> {
        self.events.push(Event::End(slot));
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.in_flight[slot] = true;
        self.events.push(Event::Submit(slot, image_index));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Present> {
        self.events.push(Event::Present(slot, image_index));
        Ok(self.present_script.pop_front().unwrap_or(Present::Optimal))
    }
}

fn settings(shadows: bool, depth: DepthConvention) -> RenderSettings {
    RenderSettings {
        shadows,
        depth,
        ..RenderSettings::default()
    }
}

/// Two triangles forming a quad: 6 vertices, 2x3 indices, one material
/// sampling a 2x2 solid texture.
fn two_triangles() -> Scene {
    let v = |x: f32, y: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        color: [1.0; 3],
        uv: [x.max(0.0), y.max(0.0)],
    };
    Scene {
        vertices: vec![
            v(-1.0, -1.0),
            v(1.0, -1.0),
            v(1.0, 1.0),
            v(-1.0, -1.0),
            v(1.0, 1.0),
            v(-1.0, 1.0),
        ],
        indices: vec![0, 1, 2, 3, 4, 5],
        roots: vec![DrawNode::new("quad", Mat4::IDENTITY).with_mesh(Mesh {
            primitives: vec![Primitive {
                first_index: 0,
                index_count: 6,
                material: 0,
            }],
        })],
        materials: vec![Material {
            name: "solid".into(),
            base_color: Some(0),
            normal_map: None,
        }],
        textures: vec![TextureData::solid(2, 2, [200, 40, 40, 255])],
    }
}

fn uniforms() -> FrameUniforms {
    FrameUniforms::new(&FrameView::default(), Mat4::IDENTITY, false)
}

#[test]
fn two_triangle_frame_draws_once_and_presents() {
    let scene = two_triangles();
    scene.validate().unwrap();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));

    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    let FrameStatus::Presented { image_index } = status else {
        panic!("expected a presented frame, got {status:?}");
    };
    assert!(image_index < backend.image_count);
    assert_eq!(backend.draws(PassKind::Main), vec![(6, 0)]);
    assert!(backend.draws(PassKind::Shadow).is_empty());
    assert_eq!(backend.extent, RenderSize::new(800, 600));
    assert_eq!(orchestrator.current_slot(), 1);

    // Second frame goes to slot 1, third reuses slot 0 after its fence.
    for _ in 0..2 {
        orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap();
    }
    assert_eq!(orchestrator.current_slot(), 1);
    assert_eq!(orchestrator.frame_number(), 3);
    let waits: Vec<_> = backend
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Wait(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![0, 1, 0]);
    assert_eq!(orchestrator.slot_state(0), SlotState::Idle);
}

#[test]
fn frame_steps_run_in_order() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();

    let position = |want: &Event| backend.events.iter().position(|e| e == want).unwrap();
    let order = [
        position(&Event::Wait(0)),
        position(&Event::Acquire(0)),
        position(&Event::Uniforms(0)),
        position(&Event::Begin(0)),
        position(&Event::BindPipeline(PassKind::Main)),
        position(&Event::BindGeometry),
        position(&Event::BindFrameSet(PassKind::Main)),
        position(&Event::BindMaterial(0)),
        position(&Event::Overlay),
        position(&Event::EndPass),
        position(&Event::End(0)),
        position(&Event::Submit(0, 0)),
        position(&Event::Present(0, 0)),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{:?}", backend.events);
}

#[test]
fn slot_is_not_recorded_before_its_fence_retires() {
    let scene = two_triangles();
    let frames = 3;
    let mut backend = MockBackend::new(frames, RenderSize::new(640, 480));
    let mut orchestrator = FrameOrchestrator::new(&RenderSettings {
        concurrent_frames: frames,
        ..settings(true, DepthConvention::Standard)
    });
    let mut window = WindowState::new(RenderSize::new(640, 480));
    for _ in 0..10 {
        orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap();
    }

    // Frame N records into slot N % frames only after the wait that
    // retires frame N - frames, which was submitted into the same slot.
    let mut last_submit = vec![None; frames];
    let mut retired = vec![true; frames];
    for (i, event) in backend.events.iter().enumerate() {
        match *event {
            Event::Submit(slot, _) => {
                last_submit[slot] = Some(i);
                retired[slot] = false;
            }
            Event::Wait(slot) => retired[slot] = true,
            Event::Begin(slot) => assert!(retired[slot], "slot {slot} reused at event {i}"),
            _ => {}
        }
    }
    assert!(last_submit.iter().all(Option::is_some));
    let submits = backend.count(|e| matches!(e, Event::Submit(..)));
    assert_eq!(submits, 10);
}

#[test]
fn out_of_date_twice_then_success() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    backend.acquire_script = VecDeque::from([Acquire::OutOfDate, Acquire::OutOfDate]);
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));

    for _ in 0..2 {
        let status = orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap();
        assert_eq!(status, FrameStatus::Recreated);
        assert_eq!(orchestrator.current_slot(), 0, "slot advanced on a stale acquire");
    }
    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert!(matches!(status, FrameStatus::Presented { .. }));
    assert_eq!(backend.recreations, 2);
    assert_eq!(backend.semaphore_generation[0], 2);
    assert_eq!(backend.count(|e| matches!(e, Event::Begin(_))), 1);
    assert_eq!(orchestrator.current_slot(), 1);
}

#[test]
fn suboptimal_acquire_abandons_the_frame() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    backend.acquire_script = VecDeque::from([Acquire::Ready {
        image_index: 1,
        suboptimal: true,
    }]);
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert_eq!(status, FrameStatus::Recreated);
    assert_eq!(backend.count(|e| matches!(e, Event::Submit(..))), 0);
    assert_eq!(backend.count(|e| matches!(e, Event::ReplaceSemaphore(0))), 1);
}

#[test]
fn stale_present_and_resize_flag_recreate_after_the_frame() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    backend.present_script = VecDeque::from([Present::OutOfDate, Present::Optimal]);
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));

    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert!(matches!(status, FrameStatus::Presented { .. }));
    assert_eq!(backend.recreations, 1);

    window.extent = RenderSize::new(1024, 768);
    window.resized = true;
    orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert_eq!(backend.recreations, 2);
    assert!(!window.resized);
    assert_eq!(backend.extent, RenderSize::new(1024, 768));
    assert_eq!(orchestrator.current_slot(), 0);
}

#[test]
fn repeated_resizes_leave_one_framebuffer_per_image() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(true, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    let sizes = [
        RenderSize::new(1280, 720),
        RenderSize::new(0, 0),
        RenderSize::new(300, 200),
        RenderSize::new(9000, 9000),
        RenderSize::new(800, 600),
    ];
    for size in sizes {
        window.extent = size;
        window.resized = true;
        let status = orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap();
        if size.is_empty() {
            assert_eq!(status, FrameStatus::Suspended);
            continue;
        }
        assert_eq!(backend.framebuffers.len(), backend.image_count as usize);
        assert!(backend.extent.width <= 4096 && backend.extent.height <= 4096);
    }
    assert_eq!(backend.extent, RenderSize::new(800, 600));
}

#[test]
fn zero_extent_suspends_without_touching_the_gpu() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(true, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(0, 0));
    window.resized = true;
    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert_eq!(status, FrameStatus::Suspended);
    assert!(backend.events.is_empty());
    assert!(window.resized, "resize must survive until the window is visible again");
    assert_eq!(orchestrator.current_slot(), 0);
}

#[test]
fn out_of_date_against_a_minimised_surface_suspends() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    // The window event carrying 0x0 has not arrived yet, but the surface
    // already reports no area.
    let mut window = WindowState::new(RenderSize::new(800, 600));
    backend.surface_reports(vk::Extent2D {
        width: 0,
        height: 0,
    });
    backend.acquire_script = VecDeque::from([Acquire::OutOfDate]);

    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert_eq!(status, FrameStatus::Suspended);
    assert!(window.resized, "rebuild must stay pending while the surface is empty");
    assert_eq!(backend.recreations, 0);
    assert_eq!(backend.extent, RenderSize::new(800, 600), "old chain kept");
    assert_eq!(backend.count(|e| matches!(e, Event::Begin(_))), 0);
    assert_eq!(orchestrator.current_slot(), 0);
    assert_eq!(orchestrator.slot_state(0), SlotState::Idle);

    // Restored: the pending rebuild happens on the next stale acquire.
    backend.surface_reports(vk::Extent2D {
        width: 1024,
        height: 768,
    });
    backend.acquire_script = VecDeque::from([Acquire::OutOfDate]);
    window.extent = RenderSize::new(1024, 768);
    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert_eq!(status, FrameStatus::Recreated);
    assert!(!window.resized);
    assert_eq!(backend.extent, RenderSize::new(1024, 768));
    assert!(matches!(
        orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap(),
        FrameStatus::Presented { .. }
    ));
}

#[test]
fn present_against_a_minimised_surface_keeps_the_resize_pending() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    backend.surface_reports(vk::Extent2D {
        width: 0,
        height: 0,
    });
    backend.present_script = VecDeque::from([Present::OutOfDate]);

    let status = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert!(matches!(status, FrameStatus::Presented { .. }));
    assert!(window.resized);
    assert_eq!(backend.recreations, 0);
    assert_eq!(orchestrator.current_slot(), 1);
}

#[test]
fn draws_outside_the_uploaded_scene_are_rejected() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));

    // A smaller scene was uploaded than the one handed to the frame.
    backend.resident = Resident {
        indices: 3,
        materials: 1,
    };
    let err = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap_err();
    let err = err.downcast::<VkError>().unwrap();
    assert!(matches!(
        err,
        VkError::DrawOutOfRange {
            first: 0,
            end: 6,
            resident: 3
        }
    ));
    assert_eq!(err.class(), lumen_core::FailureClass::Scene);
    assert!(backend.events.is_empty(), "nothing acquired or recorded");

    backend.resident = Resident {
        indices: 6,
        materials: 0,
    };
    let err = orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VkError>(),
        Some(VkError::MaterialNotResident {
            material: 0,
            resident: 0
        })
    ));

    backend.resident = Resident {
        indices: 6,
        materials: 1,
    };
    assert!(matches!(
        orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap(),
        FrameStatus::Presented { .. }
    ));
}

#[test]
fn nothing_resident_still_renders_an_empty_scene() {
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    backend.resident = Resident::default();
    let mut orchestrator = FrameOrchestrator::new(&settings(true, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    let status = orchestrator
        .draw_frame(&mut backend, &Scene::default(), &uniforms(), &mut window)
        .unwrap();
    assert!(matches!(status, FrameStatus::Presented { .. }));
    assert!(check_resident(&draw_list(&two_triangles()), Resident::default()).is_err());
}

#[test]
fn clear_depth_follows_the_configured_convention() {
    let scene = two_triangles();
    for (depth, expected) in [
        (DepthConvention::Reversed, 0.0),
        (DepthConvention::Standard, 1.0),
    ] {
        let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
        let mut orchestrator = FrameOrchestrator::new(&settings(true, depth));
        let mut window = WindowState::new(RenderSize::new(800, 600));
        orchestrator
            .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
            .unwrap();
        let clears: Vec<_> = backend
            .events
            .iter()
            .filter_map(|e| match e {
                Event::BeginPass(pass, clear) => Some((*pass, clear.depth)),
                _ => None,
            })
            .collect();
        assert_eq!(
            clears,
            vec![(PassKind::Shadow, expected), (PassKind::Main, expected)]
        );
    }
}

#[test]
fn shadow_pass_runs_first_with_bias_and_no_materials() {
    let scene = two_triangles();
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(true, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    orchestrator
        .draw_frame(&mut backend, &scene, &uniforms(), &mut window)
        .unwrap();
    assert_eq!(backend.draws(PassKind::Shadow), vec![(6, 0)]);
    assert_eq!(backend.draws(PassKind::Main), vec![(6, 0)]);
    assert_eq!(
        backend.count(|e| matches!(e, Event::DepthBias(b) if b.constant < 0.0)),
        1
    );
    assert_eq!(backend.count(|e| matches!(e, Event::BindMaterial(_))), 1);
    let viewports: Vec<_> = backend
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Viewport(v) => Some(*v),
            _ => None,
        })
        .collect();
    assert_eq!(viewports[0].width, 1024.0);
    assert_eq!(viewports[1].width, 800.0);
}

#[test]
fn viewport_flip_is_applied_consistently() {
    let vp = Viewport::covering(RenderSize::new(800, 600));
    if VIEWPORT_FLIP_Y {
        assert_eq!((vp.y, vp.height), (600.0, -600.0));
    } else {
        assert_eq!((vp.y, vp.height), (0.0, 600.0));
    }
    assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
}

#[test]
fn empty_scene_still_clears_and_presents() {
    let mut backend = MockBackend::new(2, RenderSize::new(800, 600));
    let mut orchestrator = FrameOrchestrator::new(&settings(false, DepthConvention::Reversed));
    let mut window = WindowState::new(RenderSize::new(800, 600));
    let status = orchestrator
        .draw_frame(&mut backend, &Scene::default(), &uniforms(), &mut window)
        .unwrap();
    assert!(matches!(status, FrameStatus::Presented { .. }));
    assert_eq!(backend.count(|e| matches!(e, Event::Draw { .. })), 0);
    assert_eq!(backend.count(|e| matches!(e, Event::BindGeometry)), 0);
}

#[test]
fn draw_list_accumulates_transforms_in_tree_order() {
    let prim = |first_index| Primitive {
        first_index,
        index_count: 3,
        material: 0,
    };
    let mesh = |first| Mesh {
        primitives: vec![prim(first)],
    };
    let shift = |x: f32| Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
    let scene = Scene {
        vertices: vec![Vertex::default(); 3],
        indices: vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2],
        roots: vec![
            DrawNode::new("a", shift(1.0))
                .with_mesh(mesh(0))
                .with_child(DrawNode::new("b", shift(2.0)).with_mesh(mesh(3)))
                .with_child(DrawNode::new("c", shift(4.0)).with_mesh(mesh(6))),
            DrawNode::new("d", shift(8.0)).with_mesh(mesh(9)),
        ],
        materials: vec![Material {
            name: "bumpy".into(),
            base_color: None,
            normal_map: Some(0),
        }],
        textures: vec![TextureData::solid(1, 1, [128, 128, 255, 255])],
    };
    let items = draw_list(&scene);
    let firsts: Vec<_> = items.iter().map(|i| i.primitive.first_index).collect();
    assert_eq!(firsts, vec![0, 3, 6, 9]);
    let xs: Vec<_> = items.iter().map(|i| i.transform.w_axis.x).collect();
    assert_eq!(xs, vec![1.0, 3.0, 5.0, 8.0]);
    assert!(items.iter().all(|i| i.has_normal_map));
}

#[test]
fn deep_trees_do_not_recurse() {
    let mut node = DrawNode::new("leaf", Mat4::IDENTITY).with_mesh(Mesh {
        primitives: vec![Primitive {
            first_index: 0,
            index_count: 3,
            material: 0,
        }],
    });
    for i in 0..50_000 {
        node = DrawNode::new(format!("n{i}"), Mat4::IDENTITY).with_child(node);
    }
    let scene = Scene {
        vertices: vec![Vertex::default(); 3],
        indices: vec![0, 1, 2],
        roots: vec![node],
        ..Scene::default()
    };
    assert_eq!(draw_list(&scene).len(), 1);
    // Dropping a 50k-deep tree recursively would overflow; leak it instead.
    std::mem::forget(scene);
}

#[test]
fn watchdog_tolerates_slow_fences() {
    let mut polls = 0;
    let result = wait_with_watchdog("frame fence", 10, 5, |timeout| {
        assert_eq!(timeout, 10_000_000);
        polls += 1;
        Ok(polls == 3)
    });
    assert!(result.is_ok());
    assert_eq!(polls, 3);
}

#[test]
fn watchdog_reports_a_hang() {
    let mut polls = 0;
    let err = wait_with_watchdog("frame fence", 1, 4, |_| {
        polls += 1;
        Ok(false)
    })
    .unwrap_err();
    assert_eq!(polls, 4);
    assert!(matches!(
        err,
        VkError::DeviceHang {
            timeouts: 4,
            slice_ms: 1,
            ..
        }
    ));
    assert_eq!(err.class(), lumen_core::FailureClass::Gpu);
}

#[test]
fn watchdog_propagates_device_errors() {
    let err = wait_with_watchdog("frame fence", 1, 4, |_| {
        Err(VkError::Vulkan {
            call: "vkWaitForFences",
            result: vk::Result::ERROR_DEVICE_LOST,
        })
    })
    .unwrap_err();
    assert!(matches!(err, VkError::Vulkan { .. }));
}
