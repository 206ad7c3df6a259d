use crate::character::CharacterState;
use crate::connection::{ConnectionState, Connector};
use crate::game::Session;
use macroquad::prelude::*;
use nalgebra::Vector3;
use physics::level::Level;
use shared::{CAPSULE_RADIUS, PLAYER_HEIGHT};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub local_id: Option<String>,
    pub connection: ConnectionState,
    pub physics_ready: bool,
    pub action: Option<String>,
    pub run: bool,
    pub holding: bool,
    pub first_person: bool,
    pub player_count: usize,
}

pub struct Renderer {
    width: f32,
    height: f32,
    level_edges: Vec<([f32; 3], [f32; 3])>,
}

fn to_vec3(v: &Vector3<f32>) -> Vec3 {
    vec3(v.x, v.y, v.z)
}

/// Unique triangle edges of every level mesh, for wireframe drawing.
pub fn level_edges(level: &Level) -> Vec<([f32; 3], [f32; 3])> {
    let mut edges = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (m, mesh) in level.meshes.iter().enumerate() {
        let count = mesh.vertex_count();
        let corner = |i: u32| -> Option<[f32; 3]> {
            let i = i as usize;
            (i < count).then(|| [mesh.vertices[i * 3], mesh.vertices[i * 3 + 1], mesh.vertices[i * 3 + 2]])
        };
        let indices: Vec<u32> = match &mesh.indices {
            Some(indices) => indices.clone(),
            None => (0..count as u32).collect(),
        };

        for tri in indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let key = (m, a.min(b), a.max(b));
                if !seen.insert(key) {
                    continue;
                }
                if let (Some(pa), Some(pb)) = (corner(a), corner(b)) {
                    edges.push((pa, pb));
                }
            }
        }
    }

    edges
}

impl Renderer {
    pub fn new(width: usize, height: usize, level: &Level) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
            level_edges: level_edges(level),
        }
    }

    pub fn render<C: Connector>(&mut self, session: &Session<C>) {
        self.width = screen_width();
        self.height = screen_height();
        clear_background(Color::from_rgba(26, 26, 26, 255));

        let roster = session.roster();
        self.apply_camera(session);

        draw_grid(40, 1.0, Color::from_rgba(68, 68, 68, 255), Color::from_rgba(40, 40, 40, 255));
        self.draw_level();

        if let Some(local) = roster.local() {
            // The eye sits inside the local capsule in first person.
            if !local.camera.is_first_person() {
                self.draw_character(&local.state, GREEN);
            }
        }
        for remote in roster.remotes() {
            self.draw_character(&remote.state, Color::from_rgba(255, 68, 68, 255));
        }

        if let Some(debug) = session.debug_geometry() {
            for (pair, colors) in debug.vertices.chunks_exact(2).zip(debug.colors.chunks_exact(2)) {
                let [r, g, b, a] = colors[0];
                draw_line_3d(
                    vec3(pair[0][0], pair[0][1], pair[0][2]),
                    vec3(pair[1][0], pair[1][1], pair[1][2]),
                    Color::new(r, g, b, a),
                );
            }
        }

        set_default_camera();

        let local = roster.local();
        self.draw_ui(UiConfig {
            local_id: local.map(|l| l.id().to_string()),
            connection: session.connection_state(),
            physics_ready: session.physics_ready(),
            action: local.map(|l| l.state.action.to_string()),
            run: local.map_or(true, |l| l.run),
            holding: local.map_or(false, |l| l.holding),
            first_person: local.map_or(false, |l| l.camera.is_first_person()),
            player_count: roster.remote_count() + usize::from(local.is_some()),
        });
    }

    fn apply_camera<C: Connector>(&self, session: &Session<C>) {
        let Some(local) = session.roster().local() else {
            set_camera(&Camera3D {
                position: vec3(0.0, 15.0, 25.0),
                up: vec3(0.0, 1.0, 0.0),
                target: vec3(0.0, 0.0, 0.0),
                ..Default::default()
            });
            return;
        };

        let position = local.state.position;
        let height = local.locomotion.height;
        let eye = local.camera.eye(&position, height, &local.state.rotation);
        let target = if local.camera.is_first_person() {
            eye + local.camera.forward(&position, height)
        } else {
            position
        };

        set_camera(&Camera3D {
            position: to_vec3(&eye),
            up: vec3(0.0, 1.0, 0.0),
            target: to_vec3(&target),
            ..Default::default()
        });
    }

    fn draw_level(&mut self) {
        let color = Color::from_rgba(136, 136, 136, 255);
        for (a, b) in &self.level_edges {
            draw_line_3d(vec3(a[0], a[1], a[2]), vec3(b[0], b[1], b[2]), color);
        }
    }

    fn draw_character(&mut self, state: &CharacterState, outline: Color) {
        let [r, g, b] = state.color;
        let body = Color::new(r, g, b, 1.0);
        let center = to_vec3(&state.position);
        let half_cylinder = (PLAYER_HEIGHT / 2.0 - CAPSULE_RADIUS).max(0.0);

        draw_cylinder(
            center - vec3(0.0, half_cylinder, 0.0),
            CAPSULE_RADIUS,
            CAPSULE_RADIUS,
            half_cylinder * 2.0,
            None,
            body,
        );
        draw_sphere(center + vec3(0.0, half_cylinder, 0.0), CAPSULE_RADIUS, None, body);
        draw_sphere(center - vec3(0.0, half_cylinder, 0.0), CAPSULE_RADIUS, None, body);

        // Facing and head pitch.
        let facing = state.rotation * -Vector3::z();
        let head = center + vec3(0.0, half_cylinder, 0.0);
        let (sp, cp) = state.neck_pitch.sin_cos();
        let look = vec3(facing.x * cp, sp, facing.z * cp);
        draw_line_3d(head, head + look * 1.5, outline);
        draw_line_3d(center, center + to_vec3(&facing), YELLOW);
    }

    fn draw_ui(&mut self, config: UiConfig) {
        let x = 10.0;
        let mut y = 20.0;
        let line = 16.0;

        let (status, color) = match config.connection {
            ConnectionState::Open => ("connected", GREEN),
            ConnectionState::Connecting => ("connecting", YELLOW),
            ConnectionState::Closing => ("closing", YELLOW),
            ConnectionState::Closed => ("disconnected", RED),
        };
        draw_rectangle(x, y - 8.0, 8.0, 8.0, color);
        draw_text(status, x + 12.0, y, 16.0, WHITE);
        y += line;

        if !config.physics_ready {
            draw_text("physics starting", x, y, 16.0, YELLOW);
            y += line;
        }

        if let Some(id) = &config.local_id {
            draw_text(&format!("id {}", id), x, y, 16.0, WHITE);
            y += line;
        }
        if let Some(action) = &config.action {
            draw_text(&format!("action {}", action), x, y, 16.0, WHITE);
            y += line;
        }

        let toggles = [
            ("RUN", config.run),
            ("HOLD", config.holding),
            ("FPV", config.first_person),
        ];
        for (i, (label, enabled)) in toggles.iter().enumerate() {
            let tx = x + (i as f32) * 50.0;
            let color = if *enabled { GREEN } else { RED };
            draw_rectangle(tx, y - 10.0, 10.0, 10.0, color);
            draw_text(label, tx + 14.0, y, 14.0, WHITE);
        }
        y += line;

        draw_text(&format!("{} players", config.player_count), x, y, 16.0, WHITE);

        if config.connection == ConnectionState::Closed {
            let text = "Disconnected. Press R to reconnect";
            let size = measure_text(text, None, 28, 1.0);
            draw_text(
                text,
                (self.width - size.width) / 2.0,
                self.height / 2.0,
                28.0,
                WHITE,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physics::level::LevelMesh;

    #[test]
    fn test_quad_edges_deduplicated() {
        let level = Level {
            meshes: vec![LevelMesh::quad(
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 1.0],
                [0.0, 0.0, 1.0],
            )],
        };
        // Four sides plus the shared diagonal.
        assert_eq!(level_edges(&level).len(), 5);
    }

    #[test]
    fn test_unindexed_and_bad_indices() {
        let level = Level {
            meshes: vec![
                LevelMesh {
                    vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                    indices: None,
                },
                LevelMesh {
                    vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                    indices: Some(vec![0, 1, 9]),
                },
            ],
        };
        assert_eq!(level_edges(&level).len(), 4);
    }
}
