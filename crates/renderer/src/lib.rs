//! Frame lifecycle and render orchestration.
//!
//! - [`orchestrator`]: the begin/end frame state machine over a [`PresentBackend`]
//! - [`frame_loop`] and [`frame_data`]: one frame's steps, and the global
//!   block (camera, lights) built before any render system runs
//! - [`frame_manager`]: the Vulkan swap-chain backend
//! - [`frame_resources`] and [`ubo`]: per-slot global uniform data
//! - [`systems`]: opaque, skybox, point-light and retro render systems
//! - [`Renderer`]: ties them together for one window

pub mod frame;
pub mod frame_data;
pub mod frame_loop;
pub mod frame_manager;
pub mod frame_resources;
pub mod offscreen;
pub mod orchestrator;
mod renderer;
pub mod systems;
pub mod ubo;
mod ui;

pub use frame::{FrameContext, FrameToggles, FrameUpdate};
pub use frame_data::prepare_frame_ubo;
pub use frame_loop::{FrameInputs, FramePasses, FrameView, draw_frame};
pub use frame_manager::FrameManager;
pub use orchestrator::{ActiveFrame, FrameOrchestrator, PresentBackend};
pub use renderer::Renderer;
pub use systems::RenderSystem;
pub use ui::UiOverlay;
