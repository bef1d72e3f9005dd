//! Narrow interfaces to the collaborators the optimization pipeline consumes:
//! the scene graph, the camera, the focus controller, and the renderer.
//!
//! The pipeline never owns scene nodes. It holds [`NodeId`] handles and talks
//! to the scene through [`SceneGraph`], reads camera pose from [`CameraPose`],
//! queries focus transitions through [`FocusState`], and samples renderer
//! counters through [`RendererInfo`].

mod camera;
mod focus;
mod ids;
mod nodes;
mod record;
mod renderer;

pub use camera::CameraPose;
pub use focus::{FocusFlags, FocusState, NoFocus};
pub use ids::{NodeId, ObjectId};
pub use nodes::{NodeArena, NodeBounds, SceneGraph};
pub use record::CrystalRecord;
pub use renderer::{RenderCounters, RendererInfo};
