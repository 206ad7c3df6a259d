//! Physics step loop.
//!
//! [`PhysicsWorld`] is the only mutable owner of the collision world and of
//! every character body. It runs on its own thread behind a [`PhysicsHandle`]
//! and is driven purely by [`PhysicsRequest`]s processed in arrival order.
//! Results come back as [`PhysicsEvent`]s; the caller never waits for them.

use crate::collision::{CollisionWorld, DebugLines};
use crate::controller::{CharacterBody, CharacterController, ControllerSettings, MovementIntent};
use log::{debug, error, info};
use nalgebra::{UnitQuaternion, Vector3};
use shared::{Locomotion, PlayerId};
use std::collections::HashMap;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Requests sent from the render domain to the physics thread
#[derive(Debug, Clone)]
pub enum PhysicsRequest {
    CreateCharacter {
        id: PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        locomotion: Locomotion,
    },
    ApplyMovement {
        id: PlayerId,
        intent: MovementIntent,
    },
    /// Remote characters only: teleports the kinematic body.
    UpdatePosition {
        id: PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    },
    RemoveRigidBody {
        id: PlayerId,
    },
    Step,
    DebugGeometry,
}

/// Results sent from the physics thread back to the render domain
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    Ready,
    MovementApplied {
        id: PlayerId,
        translation: Vector3<f32>,
        grounded: bool,
    },
    RotationApplied {
        id: PlayerId,
        rotation: UnitQuaternion<f32>,
    },
    PositionUpdated {
        id: PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    },
    DebugGeometry {
        vertices: Vec<[f32; 3]>,
        colors: Vec<[f32; 4]>,
    },
}

pub struct PhysicsWorld {
    collision: CollisionWorld,
    controller: CharacterController,
    characters: HashMap<PlayerId, CharacterBody>,
}

impl PhysicsWorld {
    pub fn new(collision: CollisionWorld, settings: &ControllerSettings) -> Self {
        Self {
            collision,
            controller: CharacterController::new(settings),
            characters: HashMap::new(),
        }
    }

    pub fn character(&self, id: &PlayerId) -> Option<&CharacterBody> {
        self.characters.get(id)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn collision(&self) -> &CollisionWorld {
        &self.collision
    }

    /// Processes one request and returns the events it produced, in order.
    pub fn handle(&mut self, request: PhysicsRequest) -> Vec<PhysicsEvent> {
        match request {
            PhysicsRequest::CreateCharacter {
                id,
                position,
                rotation,
                locomotion,
            } => self.create_character(id, position, rotation, locomotion),
            PhysicsRequest::ApplyMovement { id, intent } => self.apply_movement(id, &intent),
            PhysicsRequest::UpdatePosition {
                id,
                position,
                rotation,
            } => self.update_position(id, position, rotation),
            PhysicsRequest::RemoveRigidBody { id } => {
                self.remove(&id);
                Vec::new()
            }
            PhysicsRequest::Step => {
                self.collision.step();
                Vec::new()
            }
            PhysicsRequest::DebugGeometry => {
                let DebugLines { vertices, colors } = self.collision.debug_lines();
                vec![PhysicsEvent::DebugGeometry { vertices, colors }]
            }
        }
    }

    fn create_character(
        &mut self,
        id: PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        locomotion: Locomotion,
    ) -> Vec<PhysicsEvent> {
        if self.characters.contains_key(&id) {
            debug!("Replacing existing body for {}", id);
            self.remove(&id);
        }

        let (body, collider, shape) = self.collision.insert_character(
            position,
            rotation,
            locomotion.radius,
            locomotion.capsule_height(),
        );

        self.characters.insert(
            id.clone(),
            CharacterBody {
                body,
                collider,
                shape,
                translation: position,
                rotation,
                vertical_velocity: 0.0,
                grounded: false,
                locomotion,
            },
        );
        info!("Created character body for {}", id);

        vec![PhysicsEvent::RotationApplied { id, rotation }]
    }

    fn apply_movement(&mut self, id: PlayerId, intent: &MovementIntent) -> Vec<PhysicsEvent> {
        let Some(character) = self.characters.get_mut(&id) else {
            debug!("Dropping movement for unknown character {}", id);
            return Vec::new();
        };
        if !self.collision.contains_body(character.body) {
            debug!("Character {} has no collider yet", id);
            return Vec::new();
        }

        let result = self.controller.step(character, intent, &self.collision);
        self.collision
            .set_kinematic_pose(character.body, result.translation, result.rotation);

        vec![
            PhysicsEvent::MovementApplied {
                id: id.clone(),
                translation: result.translation,
                grounded: result.grounded,
            },
            PhysicsEvent::RotationApplied {
                id,
                rotation: result.rotation,
            },
        ]
    }

    fn update_position(
        &mut self,
        id: PlayerId,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> Vec<PhysicsEvent> {
        let Some(character) = self.characters.get_mut(&id) else {
            debug!("Dropping position update for unknown character {}", id);
            return Vec::new();
        };

        character.translation = position;
        character.rotation = rotation;
        self.collision
            .set_kinematic_pose(character.body, position, rotation);

        vec![PhysicsEvent::PositionUpdated {
            id,
            position,
            rotation,
        }]
    }

    fn remove(&mut self, id: &PlayerId) {
        match self.characters.remove(id) {
            Some(character) => {
                self.collision.remove_body(character.body);
                info!("Removed character body for {}", id);
            }
            None => debug!("No body to remove for {}", id),
        }
    }

    /// Drains `requests` until every sender is gone.
    pub fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<PhysicsRequest>,
        events: mpsc::UnboundedSender<PhysicsEvent>,
    ) {
        if events.send(PhysicsEvent::Ready).is_err() {
            return;
        }
        info!("Physics loop ready");

        while let Some(request) = requests.blocking_recv() {
            for event in self.handle(request) {
                if let Err(e) = events.send(event) {
                    error!("Physics event receiver dropped: {}", e);
                    return;
                }
            }
        }

        info!("Physics loop stopped");
    }
}

/// Render-side end of the physics thread. Holds no physics state.
pub struct PhysicsHandle {
    requests: mpsc::UnboundedSender<PhysicsRequest>,
    events: mpsc::UnboundedReceiver<PhysicsEvent>,
    thread: Option<JoinHandle<()>>,
}

impl PhysicsHandle {
    pub fn spawn(world: PhysicsWorld) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("physics".to_string())
            .spawn(move || world.run(request_rx, event_tx))?;

        Ok(Self {
            requests: request_tx,
            events: event_rx,
            thread: Some(thread),
        })
    }

    /// Channel-only handle with no thread behind it.
    pub fn detached(
        requests: mpsc::UnboundedSender<PhysicsRequest>,
        events: mpsc::UnboundedReceiver<PhysicsEvent>,
    ) -> Self {
        Self {
            requests,
            events,
            thread: None,
        }
    }

    pub fn send(&self, request: PhysicsRequest) {
        if let Err(e) = self.requests.send(request) {
            error!("Physics thread is gone, dropping {:?}", e.0);
        }
    }

    pub fn try_event(&mut self) -> Option<PhysicsEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!("Physics event channel closed");
                None
            }
        }
    }

    /// Everything that has arrived so far, without blocking.
    pub fn drain_events(&mut self) -> Vec<PhysicsEvent> {
        std::iter::from_fn(|| self.try_event()).collect()
    }

    /// Blocks until the next event. Not for the render loop.
    pub fn recv_blocking(&mut self) -> Option<PhysicsEvent> {
        self.events.blocking_recv()
    }

    /// Closes the request channel and waits for the thread to finish.
    pub fn shutdown(self) {
        let Self {
            requests, thread, ..
        } = self;
        drop(requests);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("Physics thread panicked");
            }
        }
    }
}
