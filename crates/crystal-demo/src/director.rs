//! Orbit camera with one scripted focus transition.

use crystal_scene::{CameraPose, FocusFlags, ObjectId};
use glam::Vec3;

const ORBIT_RAD_PER_S: f32 = 0.1;
const FOV_Y_DEG: f32 = 60.0;
const ASPECT: f32 = 16.0 / 9.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 10_000.0;
/// Distance the camera stops short of the focused crystal.
const FOCUS_STANDOFF: f32 = 25.0;

/// What the director did this frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DirectorEvent {
    FocusStarted(ObjectId),
    FocusEnded(ObjectId),
}

/// Flies the camera around the field and, once, into a crystal and back.
pub struct Director {
    orbit_radius: f32,
    focus: FocusScript,
}

struct FocusScript {
    target: ObjectId,
    target_position: Vec3,
    start_frame: u32,
    frames: u32,
    started: bool,
    ended: bool,
}

impl Director {
    /// The transition to `target` starts at `start_frame` and lasts `frames` frames.
    pub fn new(orbit_radius: f32, target: ObjectId, target_position: Vec3, start_frame: u32, frames: u32) -> Self {
        Self {
            orbit_radius,
            focus: FocusScript {
                target,
                target_position,
                start_frame,
                frames: frames.max(1),
                started: false,
                ended: false,
            },
        }
    }

    /// Camera pose for `frame` at `time_s`; updates the shared focus flags.
    pub fn step(&mut self, frame: u32, time_s: f32, flags: &FocusFlags) -> (CameraPose, Option<DirectorEvent>) {
        let orbit = self.orbit_position(time_s);
        let script = &mut self.focus;
        let end_frame = script.start_frame + script.frames;

        let mut event = None;
        let (position, target) = if frame >= script.start_frame && frame < end_frame {
            if !script.started {
                script.started = true;
                flags.set_animating(true);
                event = Some(DirectorEvent::FocusStarted(script.target.clone()));
            }
            // Ease in toward the crystal, then hold.
            let t = (frame - script.start_frame) as f32 / script.frames as f32;
            let eased = t * t * (3.0 - 2.0 * t);
            let approach = script.target_position
                + (orbit - script.target_position).normalize_or_zero() * FOCUS_STANDOFF;
            (orbit.lerp(approach, eased), script.target_position.lerp(Vec3::ZERO, 1.0 - eased))
        } else {
            if script.started && !script.ended {
                script.ended = true;
                flags.set_animating(false);
                event = Some(DirectorEvent::FocusEnded(script.target.clone()));
            }
            (orbit, Vec3::ZERO)
        };

        let pose = CameraPose::perspective_look_at(position, target, FOV_Y_DEG.to_radians(), ASPECT, NEAR, FAR);
        (pose, event)
    }

    fn orbit_position(&self, time_s: f32) -> Vec3 {
        let angle = time_s * ORBIT_RAD_PER_S;
        Vec3::new(
            angle.cos() * self.orbit_radius,
            self.orbit_radius * 0.3,
            angle.sin() * self.orbit_radius,
        )
    }
}
