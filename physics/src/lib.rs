//! # Character Physics
//!
//! Kinematic character movement against static level geometry, run on a
//! dedicated thread and driven entirely by messages.
//!
//! ## Module Organization
//!
//! ### Level Module (`level`)
//! Raw mesh buffers for the static world, either loaded from a JSON level
//! file or generated by the built-in demo layout.
//!
//! ### Collision Module (`collision`)
//! Owns the rapier pipeline state:
//! - Static trimesh colliders built once from level meshes
//! - Kinematic capsule bodies for characters
//! - Capsule sweeps through a query pipeline that ignores the moving body
//! - Wireframe extraction for debug drawing
//!
//! ### Controller Module (`controller`)
//! One tick of character movement: jump and ground reset, gravity, the
//! collision-corrected sweep, and facing.
//!
//! ### Service Module (`service`)
//! The step loop. `PhysicsWorld` holds the registry of character bodies and
//! applies `PhysicsRequest`s in order; `PhysicsHandle` is the render-side end
//! of the channels and never sees physics state.
//!
//! ## Usage Example
//!
//! ```no_run
//! use physics::collision::CollisionWorld;
//! use physics::controller::ControllerSettings;
//! use physics::level::Level;
//! use physics::service::{PhysicsHandle, PhysicsRequest, PhysicsWorld};
//!
//! let level = Level::demo();
//! let collision = CollisionWorld::build(&level.meshes, shared::GRAVITY)?;
//! let world = PhysicsWorld::new(collision, &ControllerSettings::default());
//! let mut handle = PhysicsHandle::spawn(world)?;
//!
//! handle.send(PhysicsRequest::Step);
//! for event in handle.drain_events() {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collision;
pub mod controller;
pub mod level;
pub mod service;
