//! Top-level renderer.

use std::mem::ManuallyDrop;
use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info, warn};

use dither_assets::SkyGradient;
use dither_core::{FogConfig, RenderMode, RendererConfig};
use dither_platform::{Surface, Window};
use dither_rhi::command::CommandBuffer;
use dither_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
use dither_rhi::device::Device;
use dither_rhi::instance::Instance;
use dither_rhi::physical_device::select_physical_device;
use dither_rhi::texture::Texture;
use dither_rhi::{RhiError, RhiResult};
use dither_scene::{Camera, Material, ObjectRegistry};

use crate::frame::{FrameContext, FrameToggles, FrameUpdate};
use crate::frame_loop::{FrameInputs, FramePasses, FrameView, draw_frame};
use crate::frame_manager::FrameManager;
use crate::frame_resources::FrameResources;
use crate::orchestrator::{ActiveFrame, FrameOrchestrator};
use crate::systems::{
    PointLightSystem, RenderSystem, RetroRenderSystem, SimpleRenderSystem, SkyboxSystem,
    SystemInit,
};
use crate::ui::UiOverlay;

/// Edge length of each generated skybox face.
const SKYBOX_FACE_SIZE: u32 = 256;

/// Owns the Vulkan context, the frame loop and the render systems.
///
/// Meshes, materials and material pools created from [`Renderer::device`]
/// must be dropped before the renderer, after [`Renderer::wait_idle`].
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Render systems (pipelines, offscreen target, composite sets)
/// 3. Global descriptor sets and uniform buffers
/// 4. Skybox cubemap and material layout
/// 5. Frame orchestrator (swap chain, command buffers, sync)
/// 6. Surface
/// 7. Device (with its last reference)
/// 8. Instance
pub struct Renderer {
    systems: Vec<Box<dyn RenderSystem>>,
    frame_resources: ManuallyDrop<FrameResources>,
    skybox: ManuallyDrop<Texture>,
    material_layout: ManuallyDrop<DescriptorSetLayout>,
    orchestrator: ManuallyDrop<FrameOrchestrator<FrameManager>>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,

    mode: RenderMode,
    fog: FogConfig,
    toggles: FrameToggles,
    max_point_lights: usize,
    offscreen_extent: vk::Extent2D,
}

impl Renderer {
    /// Bring up Vulkan for `window` and build the render systems of
    /// `config.render.mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable GPU is found, a shader cannot be
    /// loaded, or any Vulkan object fails to be created.
    pub fn new(window: &Window, config: &RendererConfig) -> RhiResult<Self> {
        let render = &config.render;
        let (width, height) = window.size();
        info!(
            "Initializing renderer ({}x{}, {:?} mode, {} frame(s) in flight)",
            width, height, render.mode, render.frames_in_flight
        );

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(c"dither", render.validation, &surface_extensions)?;
        if render.validation && !instance.has_validation() {
            warn!("Validation requested but the layer is unavailable");
        }
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let frame_manager = FrameManager::new(
            &instance,
            device.clone(),
            surface.handle(),
            vk::Extent2D { width, height },
            render.frames_in_flight,
            render.clear_color,
        )?;
        let render_pass = frame_manager.render_pass();
        let orchestrator = FrameOrchestrator::new(frame_manager);

        let faces = SkyGradient::default()
            .cube_faces(SKYBOX_FACE_SIZE)
            .map_err(|e| RhiError::InvalidResource(e.to_string()))?;
        let skybox = Texture::cube_from_rgba8(
            device.clone(),
            SKYBOX_FACE_SIZE,
            faces.each_ref().map(|face| face.pixels.as_slice()),
        )?;

        let frame_resources = FrameResources::new(device.clone(), render.frames_in_flight, &skybox)?;
        let material_layout = Material::set_layout(device.clone())?;

        let shader_dir = PathBuf::from(&render.shader_dir);
        let init = SystemInit {
            device: device.clone(),
            shader_dir: &shader_dir,
            render_pass,
            global_layout: frame_resources.layout(),
            material_layout: &material_layout,
        };
        let systems: Vec<Box<dyn RenderSystem>> = match render.mode {
            RenderMode::Standard => vec![
                Box::new(SimpleRenderSystem::new(&init)?),
                Box::new(SkyboxSystem::new(&init)?),
                Box::new(PointLightSystem::new(&init)?),
            ],
            RenderMode::Retro => vec![Box::new(RetroRenderSystem::new(&init, render)?)],
        };

        info!(
            "Renderer initialized with systems: {}",
            systems.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            systems,
            frame_resources: ManuallyDrop::new(frame_resources),
            skybox: ManuallyDrop::new(skybox),
            material_layout: ManuallyDrop::new(material_layout),
            orchestrator: ManuallyDrop::new(orchestrator),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            mode: render.mode,
            fog: config.fog,
            toggles: FrameToggles::from_config(config),
            max_point_lights: render.max_point_lights,
            offscreen_extent: vk::Extent2D {
                width: render.offscreen_width,
                height: render.offscreen_height,
            },
        })
    }

    /// Render one frame.
    ///
    /// Point lights are orbited and packed into the global block before any
    /// system runs, whatever the mode.
    ///
    /// Returns `false` when the frame was skipped (minimized window, or the
    /// swap chain was rebuilt instead).
    ///
    /// # Errors
    ///
    /// Returns an error if acquiring, uploading, submitting or presenting fails.
    ///
    /// # Panics
    ///
    /// Panics if `objects` holds more point lights than `render.max_point_lights`.
    pub fn render_frame(
        &mut self,
        camera: &Camera,
        objects: &mut ObjectRegistry,
        frame_time: f32,
        ui: Option<&mut dyn UiOverlay>,
    ) -> RhiResult<bool> {
        let inputs = FrameInputs {
            camera,
            objects,
            frame_time,
            toggles: &self.toggles,
            max_point_lights: self.max_point_lights,
        };
        let mut passes = SystemPasses {
            systems: &mut self.systems,
            frame_resources: &*self.frame_resources,
            fog: &self.fog,
            ui,
        };
        let drawn = draw_frame(&mut *self.orchestrator, inputs, &mut passes)?;
        Ok(drawn.is_some())
    }

    /// Forward a window resize. The swap chain is rebuilt at the next frame boundary.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.orchestrator.request_resize(width, height);
    }

    /// Aspect ratio the camera projection should use.
    ///
    /// In retro mode the scene is rendered at the offscreen target's size.
    pub fn aspect_ratio(&self) -> f32 {
        match self.mode {
            RenderMode::Retro => {
                self.offscreen_extent.width as f32 / self.offscreen_extent.height as f32
            }
            RenderMode::Standard => self.orchestrator.aspect_ratio(),
        }
    }

    /// Swap-chain extent frames are currently rendered at.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.orchestrator.extent()
    }

    /// Frame slot the next frame uses.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.orchestrator.frame_index()
    }

    #[inline]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Map and light settings applied from the next frame on.
    #[inline]
    pub fn toggles(&self) -> &FrameToggles {
        &self.toggles
    }

    #[inline]
    pub fn toggles_mut(&mut self) -> &mut FrameToggles {
        &mut self.toggles
    }

    /// Device scene resources (meshes, materials) are created on.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Layout material descriptor sets are allocated with.
    #[inline]
    pub fn material_layout(&self) -> &DescriptorSetLayout {
        &self.material_layout
    }

    /// Pool sized for exactly `material_count` materials.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn create_material_pool(&self, material_count: u32) -> RhiResult<DescriptorPool> {
        Material::pool(Arc::clone(&*self.device), material_count)
    }

    /// Cubemap sampled by the skybox pass.
    #[inline]
    pub fn skybox(&self) -> &Texture {
        &self.skybox
    }

    /// Block until the GPU has finished all submitted work.
    ///
    /// Call before dropping scene resources created from [`Renderer::device`].
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

/// The installed render systems, run in order for one frame.
struct SystemPasses<'a, 'u> {
    systems: &'a mut [Box<dyn RenderSystem>],
    frame_resources: &'a FrameResources,
    fog: &'a FogConfig,
    ui: Option<&'a mut (dyn UiOverlay + 'u)>,
}

impl<'a> SystemPasses<'a, '_> {
    fn context<'c>(
        &self,
        command_buffer: &'c CommandBuffer,
        frame: &ActiveFrame<vk::CommandBuffer>,
        view: &FrameView<'c>,
    ) -> FrameContext<'c>
    where
        'a: 'c,
    {
        FrameContext {
            frame_index: frame.slot(),
            frame_time: view.frame_time,
            command_buffer,
            camera: view.camera,
            global_descriptor_set: self.frame_resources.descriptor_set(frame.slot()),
            objects: view.objects,
            fog: self.fog,
            toggles: view.toggles,
            extent: view.extent,
        }
    }
}

impl FramePasses<FrameManager> for SystemPasses<'_, '_> {
    fn prepare(&mut self, update: &mut FrameUpdate<'_>) -> RhiResult<()> {
        for system in self.systems.iter_mut() {
            system.begin_frame(update)?;
        }
        self.frame_resources.upload(update.frame_index, &*update.ubo)
    }

    fn record_offscreen(
        &mut self,
        backend: &FrameManager,
        frame: &ActiveFrame<vk::CommandBuffer>,
        view: &FrameView<'_>,
    ) {
        let cmd = backend.command_buffer(frame.commands());
        let ctx = self.context(&cmd, frame, view);
        for system in self.systems.iter() {
            system.record_offscreen(&ctx);
        }
    }

    fn record(
        &mut self,
        backend: &FrameManager,
        frame: &ActiveFrame<vk::CommandBuffer>,
        view: &FrameView<'_>,
    ) {
        let cmd = backend.command_buffer(frame.commands());
        let ctx = self.context(&cmd, frame, view);
        for system in self.systems.iter() {
            system.record(&ctx);
        }
        if let Some(ui) = self.ui.as_deref_mut() {
            ui.draw_ui(&ctx);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }

        self.systems.clear();

        unsafe {
            ManuallyDrop::drop(&mut self.frame_resources);
            ManuallyDrop::drop(&mut self.skybox);
            ManuallyDrop::drop(&mut self.material_layout);
            ManuallyDrop::drop(&mut self.orchestrator);
            ManuallyDrop::drop(&mut self.surface);
        }

        let outstanding = Arc::strong_count(&*self.device) - 1;
        if outstanding > 0 {
            warn!(
                "{} device reference(s) outlive the renderer; their resources leak",
                outstanding
            );
        }

        unsafe {
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
