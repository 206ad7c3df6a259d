//! # Character Client Library
//!
//! Client side of the networked character demo: input capture, the local
//! character pipeline, peer synchronization over WebSocket, and a debug
//! renderer. Character physics runs on its own thread (see the `physics`
//! crate); this crate only exchanges messages with it.
//!
//! ## Architecture Overview
//!
//! Each display frame runs one pass of the local pipeline:
//!
//! ```text
//! input -> movement intent -> physics thread -> movement/rotation result
//!       -> local transform -> action state machine -> synchronizer -> wire
//! ```
//!
//! Results from physics arrive on a later frame than the request that caused
//! them; nothing here waits for them. Inbound `move` packets never touch the
//! controller. They teleport the peer's kinematic body and the confirmed pose
//! comes back as a physics event.
//!
//! ### Local and Remote Characters
//! The local character is driven by input and controller results. Remote
//! characters are driven only by inbound packets and have no input path at
//! all, so a peer can never be moved by local keys.
//!
//! ### Gesture Locking
//! Yes/No/Wave play once and hold a single lock tied to the clip that was
//! started. While it is held the character cannot walk, run, jump or start
//! another gesture. Only the completion of that exact clip releases it.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! - Key groups for movement, jump, gestures and toggles
//! - 300 ms debounce on the run, view and holding toggles
//! - Pointer and touch deltas, activity detection for the watchdog
//!
//! ### Camera Module (`camera`)
//! Third-person orbit and first-person look, plus the yaw-only look
//! quaternion handed to physics in first person.
//!
//! ### Movement Module (`movement`)
//! Camera-relative walk direction, the jump latch and the airborne grace
//! window. Produces the `MovementIntent` for each frame.
//!
//! ### Animation Module (`animation`)
//! The action state machine, gesture lock and a clip player that reports
//! when play-once clips finish.
//!
//! ### Character and Roster Modules (`character`, `roster`)
//! Local and remote character variants over a shared state shape, and the
//! registry that owns them for the session.
//!
//! ### Sync Module (`sync`)
//! Threshold-gated `move` broadcasts, the rate-limited `neckRotationX`
//! channel and application of inbound packets.
//!
//! ### Connection Module (`connection`)
//! - tokio-tungstenite socket task with channel handoff to the frame loop
//! - Sends refused unless the socket is open
//! - Inactivity watchdog and reconnect through a `Connector`
//!
//! ### Game Module (`game`)
//! `Session` ties the above together once per frame.
//!
//! ### Rendering Module (`rendering`)
//! Capsules, facing and head pitch, level wireframe, collider debug lines and
//! the HUD.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::connection::WebSocketConnector;
//! use client::game::Session;
//! use client::input::InputManager;
//! use client::sync::Synchronizer;
//! use physics::collision::CollisionWorld;
//! use physics::controller::ControllerSettings;
//! use physics::level::Level;
//! use physics::service::{PhysicsHandle, PhysicsWorld};
//! use std::time::Instant;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let level = Level::demo();
//! let collision = CollisionWorld::build(&level.meshes, shared::GRAVITY)?;
//! let physics = PhysicsHandle::spawn(PhysicsWorld::new(collision, &ControllerSettings::default()))?;
//!
//! let connector = WebSocketConnector::new(runtime.handle().clone(), "ws://localhost:3000");
//! let mut session = Session::new(connector, physics, Synchronizer::default());
//! let mut input = InputManager::new();
//!
//! // Once per display frame
//! let now = Instant::now();
//! let frame = input.update(now);
//! session.frame(&frame, 1.0 / 60.0, now);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod animation;
pub mod camera;
pub mod character;
pub mod connection;
pub mod game;
pub mod input;
pub mod movement;
pub mod rendering;
pub mod roster;
pub mod sync;
