//! Static collision world built once from level geometry.
//!
//! Holds the complete rapier pipeline state. Level meshes become trimesh
//! colliders on fixed bodies; characters are kinematic position-based bodies
//! with an upright capsule. The world never moves static geometry after
//! [`CollisionWorld::build`].

use crate::level::LevelMesh;
use log::{debug, info};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::control::KinematicCharacterController;
use rapier3d::prelude::{
    BroadPhaseBvh, CCDSolver, Capsule, ColliderBuilder, ColliderHandle, ColliderSet, DebugColor,
    DebugRenderBackend, DebugRenderObject, DebugRenderPipeline, ImpulseJointSet,
    IntegrationParameters, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline,
    QueryFilter, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};
use thiserror::Error;

const CHARACTER_MASS: f32 = 100.0;

#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("mesh {mesh}: vertex buffer length {len} is not a multiple of 3")]
    RaggedVertices { mesh: usize, len: usize },
    #[error("mesh {mesh}: index buffer length {len} is not a multiple of 3")]
    RaggedIndices { mesh: usize, len: usize },
    #[error("mesh {mesh}: index {index} out of range for {vertices} vertices")]
    IndexOutOfRange {
        mesh: usize,
        index: u32,
        vertices: usize,
    },
    #[error("mesh {mesh}: {reason}")]
    InvalidTrimesh { mesh: usize, reason: String },
}

/// One capsule sweep request against the world.
#[derive(Debug, Clone, Copy)]
pub struct SweepQuery {
    /// Body doing the sweep; excluded from its own query.
    pub body: RigidBodyHandle,
    pub shape: Capsule,
    pub pose: Isometry3<f32>,
    pub desired: Vector3<f32>,
    pub dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepOutcome {
    /// Corrected displacement, never longer than the desired one.
    pub translation: Vector3<f32>,
    pub grounded: bool,
}

/// Moves a capsule through world geometry and reports how far it got.
pub trait CapsuleSweep {
    fn sweep(&self, controller: &KinematicCharacterController, query: &SweepQuery)
        -> SweepOutcome;
}

/// Line-segment dump of every collider, two vertices and two RGBA colors per line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugLines {
    pub vertices: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
}

impl DebugRenderBackend for DebugLines {
    fn draw_line(
        &mut self,
        _object: DebugRenderObject<'_>,
        a: Point3<f32>,
        b: Point3<f32>,
        color: DebugColor,
    ) {
        let rgba = hsla_to_rgba(color);
        self.vertices.push([a.x, a.y, a.z]);
        self.vertices.push([b.x, b.y, b.z]);
        self.colors.push(rgba);
        self.colors.push(rgba);
    }
}

/// Rapier's debug palette is HSLA.
fn hsla_to_rgba([h, s, l, a]: [f32; 4]) -> [f32; 4] {
    let [r, g, b] = hsl_to_rgb(h, s, l);
    [r, g, b, a]
}

/// Hue in degrees, wrapped; saturation and lightness in 0..=1.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = (h / 60.0).rem_euclid(6.0);
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    [r + m, g + m, b + m]
}

pub struct CollisionWorld {
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    debug_pipeline: DebugRenderPipeline,
    static_colliders: usize,
}

impl CollisionWorld {
    /// Builds the static world. Meshes without vertices are skipped.
    pub fn build(meshes: &[LevelMesh], gravity: f32) -> Result<Self, CollisionError> {
        let mut world = Self {
            gravity: Vector3::new(0.0, gravity, 0.0),
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            debug_pipeline: DebugRenderPipeline::default(),
            static_colliders: 0,
        };

        for (index, mesh) in meshes.iter().enumerate() {
            if mesh.vertices.is_empty() {
                debug!("Skipping empty mesh {}", index);
                continue;
            }
            world.insert_trimesh(index, mesh)?;
        }

        // Populate the broad phase so sweeps work before the first tick.
        world.step();

        info!(
            "Collision world built with {} static colliders",
            world.static_colliders
        );
        Ok(world)
    }

    fn insert_trimesh(&mut self, index: usize, mesh: &LevelMesh) -> Result<(), CollisionError> {
        if mesh.vertices.len() % 3 != 0 {
            return Err(CollisionError::RaggedVertices {
                mesh: index,
                len: mesh.vertices.len(),
            });
        }

        let points: Vec<Point3<f32>> = mesh
            .vertices
            .chunks_exact(3)
            .map(|v| Point3::new(v[0], v[1], v[2]))
            .collect();

        let flat: Vec<u32> = match &mesh.indices {
            Some(indices) => indices.clone(),
            None => (0..points.len() as u32).collect(),
        };
        if flat.len() % 3 != 0 {
            return Err(CollisionError::RaggedIndices {
                mesh: index,
                len: flat.len(),
            });
        }
        if let Some(&bad) = flat.iter().find(|&&i| i as usize >= points.len()) {
            return Err(CollisionError::IndexOutOfRange {
                mesh: index,
                index: bad,
                vertices: points.len(),
            });
        }

        let triangles: Vec<[u32; 3]> = flat.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect();
        if triangles.is_empty() {
            debug!("Skipping mesh {} without triangles", index);
            return Ok(());
        }

        let collider = ColliderBuilder::trimesh(points, triangles)
            .map_err(|e| CollisionError::InvalidTrimesh {
                mesh: index,
                reason: format!("{:?}", e),
            })?
            .build();

        let body = self.bodies.insert(RigidBodyBuilder::fixed().build());
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        self.static_colliders += 1;
        Ok(())
    }

    pub fn static_collider_count(&self) -> usize {
        self.static_colliders
    }

    /// Kinematic body with a Y-aligned capsule; `height` is the cylinder part.
    pub fn insert_character(
        &mut self,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        radius: f32,
        height: f32,
    ) -> (RigidBodyHandle, ColliderHandle, Capsule) {
        let pose = Isometry3::from_parts(Translation3::from(translation), rotation);
        let body = self
            .bodies
            .insert(RigidBodyBuilder::kinematic_position_based().pose(pose).build());

        let half_height = height / 2.0;
        let collider = ColliderBuilder::capsule_y(half_height, radius)
            .mass(CHARACTER_MASS)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);

        (body, collider, Capsule::new_y(half_height, radius))
    }

    /// Schedules the kinematic pose reached at the next [`CollisionWorld::step`].
    pub fn set_kinematic_pose(
        &mut self,
        body: RigidBodyHandle,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) {
        if let Some(body) = self.bodies.get_mut(body) {
            body.set_next_kinematic_position(Isometry3::from_parts(
                Translation3::from(translation),
                rotation,
            ));
        }
    }

    pub fn remove_body(&mut self, body: RigidBodyHandle) -> bool {
        self.bodies
            .remove(
                body,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn body_translation(&self, body: RigidBodyHandle) -> Option<Vector3<f32>> {
        self.bodies.get(body).map(|b| *b.translation())
    }

    pub fn contains_body(&self, body: RigidBodyHandle) -> bool {
        self.bodies.contains(body)
    }

    /// Advances kinematic bodies to their scheduled poses and refreshes contacts.
    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    pub fn debug_lines(&mut self) -> DebugLines {
        let mut lines = DebugLines::default();
        self.debug_pipeline.render(
            &mut lines,
            &self.bodies,
            &self.colliders,
            &self.impulse_joints,
            &self.multibody_joints,
            &self.narrow_phase,
        );
        lines
    }
}

impl CapsuleSweep for CollisionWorld {
    fn sweep(
        &self,
        controller: &KinematicCharacterController,
        query: &SweepQuery,
    ) -> SweepOutcome {
        let filter = QueryFilter::default().exclude_rigid_body(query.body);
        let pipeline = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );

        let movement = controller.move_shape(
            query.dt,
            &pipeline,
            &query.shape,
            &query.pose,
            query.desired,
            |_| {},
        );

        SweepOutcome {
            translation: movement.translation,
            grounded: movement.grounded,
        }
    }
}
