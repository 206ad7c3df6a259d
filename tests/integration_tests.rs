//! Integration tests for the character pipeline
//!
//! These tests run the real physics thread, a full session against an
//! in-memory connection, and a WebSocket round trip over a local socket.

use assert_approx_eq::assert_approx_eq;
use client::connection::{Connection, ConnectionEvent, ConnectionPeer};
use client::game::Session;
use client::input::{DirectionKeys, InputFrame};
use client::roster::Roster;
use client::sync::Synchronizer;
use nalgebra::{UnitQuaternion, Vector3};
use physics::collision::CollisionWorld;
use physics::controller::{ControllerSettings, MovementIntent};
use physics::level::Level;
use physics::service::{PhysicsEvent, PhysicsHandle, PhysicsRequest, PhysicsWorld};
use shared::{Action, Locomotion, Packet, PlayerId, WireQuat, WireVec3, GRAVITY};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn demo_world() -> PhysicsWorld {
    let level = Level::demo();
    let collision = CollisionWorld::build(&level.meshes, GRAVITY).unwrap();
    PhysicsWorld::new(collision, &ControllerSettings::default())
}

fn idle(dt: f32) -> MovementIntent {
    MovementIntent {
        dt,
        ..Default::default()
    }
}

/// PHYSICS PIPELINE TESTS
mod physics_tests {
    use super::*;

    /// A character dropped at the spawn point lands on the demo floor.
    #[test]
    fn spawned_character_settles_on_floor() {
        let mut handle = PhysicsHandle::spawn(demo_world()).unwrap();
        assert_eq!(handle.recv_blocking(), Some(PhysicsEvent::Ready));

        let id = PlayerId::Number(1);
        handle.send(PhysicsRequest::CreateCharacter {
            id: id.clone(),
            position: Vector3::new(0.0, 8.0, 0.0),
            rotation: UnitQuaternion::identity(),
            locomotion: Locomotion::default(),
        });
        assert!(matches!(
            handle.recv_blocking(),
            Some(PhysicsEvent::RotationApplied { .. })
        ));

        let mut landed = None;
        for _ in 0..300 {
            handle.send(PhysicsRequest::ApplyMovement {
                id: id.clone(),
                intent: idle(1.0 / 60.0),
            });
            handle.send(PhysicsRequest::Step);

            let Some(PhysicsEvent::MovementApplied {
                translation,
                grounded,
                ..
            }) = handle.recv_blocking()
            else {
                panic!("expected a movement result");
            };
            assert!(matches!(
                handle.recv_blocking(),
                Some(PhysicsEvent::RotationApplied { .. })
            ));

            if grounded {
                landed = Some(translation);
                break;
            }
        }

        let landed = landed.expect("character never landed");
        assert!(landed.y > 1.5 && landed.y < 1.9, "landed at {}", landed.y);
        assert_approx_eq!(landed.x, 0.0, 1e-3);
        handle.shutdown();
    }

    /// Jump on tick 1, airborne by tick 2, falling until contact, then exactly 0.
    #[test]
    fn jump_arc_resets_velocity_on_contact() {
        let mut world = demo_world();
        let id = PlayerId::Number(7);
        let dt = 1.0 / 60.0;
        world.handle(PhysicsRequest::CreateCharacter {
            id: id.clone(),
            position: Vector3::new(0.0, 2.0, 0.0),
            rotation: UnitQuaternion::identity(),
            locomotion: Locomotion::default(),
        });

        for _ in 0..120 {
            world.handle(PhysicsRequest::ApplyMovement {
                id: id.clone(),
                intent: idle(dt),
            });
        }
        let body = world.character(&id).unwrap();
        assert!(body.grounded);
        assert_eq!(body.vertical_velocity, 0.0);

        let jump = MovementIntent {
            jump: true,
            ..idle(dt)
        };
        world.handle(PhysicsRequest::ApplyMovement {
            id: id.clone(),
            intent: jump,
        });
        let body = world.character(&id).unwrap();
        assert!(!body.grounded);
        assert_approx_eq!(body.vertical_velocity, 15.0 + GRAVITY * dt, 1e-4);

        let mut was_falling = false;
        let mut landed = false;
        for _ in 0..240 {
            world.handle(PhysicsRequest::ApplyMovement {
                id: id.clone(),
                intent: idle(dt),
            });
            let body = world.character(&id).unwrap();
            if body.grounded {
                assert_eq!(body.vertical_velocity, 0.0);
                landed = true;
                break;
            }
            if was_falling {
                assert!(body.vertical_velocity < 0.0);
            }
            was_falling |= body.vertical_velocity < 0.0;
        }
        assert!(was_falling);
        assert!(landed);
    }

    /// Requests in flight for a removed id are dropped.
    #[test]
    fn removed_character_requests_are_ignored() {
        let mut world = demo_world();
        let id = PlayerId::from("gone");
        world.handle(PhysicsRequest::CreateCharacter {
            id: id.clone(),
            position: Vector3::new(0.0, 8.0, 0.0),
            rotation: UnitQuaternion::identity(),
            locomotion: Locomotion::default(),
        });
        world.handle(PhysicsRequest::RemoveRigidBody { id: id.clone() });

        assert!(world
            .handle(PhysicsRequest::ApplyMovement {
                id: id.clone(),
                intent: idle(0.016),
            })
            .is_empty());
        assert!(world
            .handle(PhysicsRequest::UpdatePosition {
                id,
                position: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
            })
            .is_empty());
        assert_eq!(world.character_count(), 0);
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    type BoxedConnector = Box<dyn FnMut() -> Connection>;

    fn session() -> (Session<BoxedConnector>, Rc<RefCell<Vec<ConnectionPeer>>>) {
        let peers = Rc::new(RefCell::new(Vec::new()));
        let stash = Rc::clone(&peers);
        let connector: BoxedConnector = Box::new(move || {
            let (conn, peer) = Connection::pair();
            stash.borrow_mut().push(peer);
            conn
        });
        let physics = PhysicsHandle::spawn(demo_world()).unwrap();
        (Session::new(connector, physics, Synchronizer::default()), peers)
    }

    fn run_frames(session: &mut Session<BoxedConnector>, input: &InputFrame, frames: usize) {
        for _ in 0..frames {
            session.frame(input, 1.0 / 60.0, Instant::now());
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Assigned id spawns, falls, lands, then walks forward and broadcasts.
    #[test]
    fn local_character_lands_and_walks() {
        let (mut session, peers) = session();
        {
            let peers = peers.borrow();
            let peer = &peers[0];
            peer.open();
            peer.deliver(Packet::AssignId { id: 3u64.into() });
        }

        let mut grounded = false;
        for _ in 0..400 {
            run_frames(&mut session, &InputFrame::default(), 1);
            if session.roster().local().is_some_and(|l| l.air().grounded()) {
                grounded = true;
                break;
            }
        }
        assert!(grounded, "local character never landed");
        assert!(session.physics_ready());

        let start = session.roster().local().unwrap().state.position;
        let walk = InputFrame {
            directions: DirectionKeys {
                forward: true,
                ..Default::default()
            },
            ..Default::default()
        };
        run_frames(&mut session, &walk, 30);
        // Physics results land a frame or two after the request.
        run_frames(&mut session, &InputFrame::default(), 5);

        let local = session.roster().local().unwrap();
        let travelled = local.state.position - start;
        // Default camera looks down -Z.
        assert!(travelled.z < -1.0, "moved {:?}", travelled);

        let sent = peers.borrow_mut()[0].sent();
        let moves: Vec<&Packet> = sent
            .iter()
            .filter(|p| matches!(p, Packet::Move { .. }))
            .collect();
        assert!(moves.len() > 1);
        assert!(sent
            .iter()
            .any(|p| matches!(p, Packet::Move { action, .. } if action == "Run")));
        assert!(sent
            .iter()
            .all(|p| matches!(p, Packet::Move { id, .. } if *id == PlayerId::Number(3))));

        session.shutdown();
    }

    /// One jump tap through the whole frame pipeline takes off exactly once.
    #[test]
    fn single_jump_tap_launches_once() {
        let (mut session, peers) = session();
        {
            let peers = peers.borrow();
            let peer = &peers[0];
            peer.open();
            peer.deliver(Packet::AssignId { id: 4u64.into() });
        }

        let idle = InputFrame::default();
        let mut grounded = false;
        for _ in 0..400 {
            run_frames(&mut session, &idle, 1);
            if session.roster().local().is_some_and(|l| l.air().grounded()) {
                grounded = true;
                break;
            }
        }
        assert!(grounded, "local character never landed");
        run_frames(&mut session, &idle, 10);

        let tap = InputFrame {
            jump: true,
            ..Default::default()
        };
        run_frames(&mut session, &tap, 1);

        let mut takeoffs = 0;
        let mut was_grounded = true;
        for _ in 0..300 {
            run_frames(&mut session, &idle, 1);
            let now_grounded = session.roster().local().unwrap().air().grounded();
            if was_grounded && !now_grounded {
                takeoffs += 1;
            }
            was_grounded = now_grounded;
        }

        assert_eq!(takeoffs, 1);
        assert!(was_grounded, "character never came back down");
        assert!(!session.roster().local().unwrap().air().jumping());
        session.shutdown();
    }

    /// After the socket drops, peers are gone and nothing more goes out.
    #[test]
    fn socket_closure_tears_down_remotes() {
        let (mut session, peers) = session();
        {
            let peers = peers.borrow();
            let peer = &peers[0];
            peer.open();
            peer.deliver(Packet::AssignId { id: 1u64.into() });
            peer.deliver(Packet::NewPlayer { id: 2u64.into() });
        }
        run_frames(&mut session, &InputFrame::default(), 3);
        assert_eq!(session.roster().remote_count(), 1);

        peers.borrow()[0].close();
        peers.borrow_mut()[0].sent();
        run_frames(&mut session, &InputFrame::default(), 3);

        assert_eq!(session.roster().remote_count(), 0);
        assert!(session.can_reconnect());
        assert!(peers.borrow_mut()[0].sent().is_empty());
        session.shutdown();
    }
}

/// SYNCHRONIZATION TESTS
mod sync_tests {
    use super::*;

    /// Remote `move` with "Run" while Idle crossfades once and the physics
    /// thread confirms the pose.
    #[test]
    fn remote_run_triggers_one_crossfade() {
        let mut physics = PhysicsHandle::spawn(demo_world()).unwrap();
        assert_eq!(physics.recv_blocking(), Some(PhysicsEvent::Ready));

        let mut sync = Synchronizer::default();
        let mut roster = Roster::new();
        let now = Instant::now();
        let peer = PlayerId::Number(5);

        sync.apply_inbound(
            Packet::NewPlayer { id: peer.clone() },
            &mut roster,
            &physics,
            now,
        );
        assert_eq!(
            roster.remote(&peer).unwrap().animation().current(),
            Action::Idle
        );

        let run = || Packet::Move {
            id: PlayerId::Number(5),
            position: WireVec3 {
                x: 2.0,
                y: 1.7,
                z: -3.0,
            },
            quaternion: WireQuat::default(),
            action: "Run".to_string(),
        };
        let fades: Vec<_> = (0..3)
            .filter_map(|_| sync.apply_inbound(run(), &mut roster, &physics, now))
            .collect();
        assert_eq!(fades.len(), 1);
        assert_eq!((fades[0].from, fades[0].to), (Action::Idle, Action::Run));
        assert_eq!(roster.remote(&peer).unwrap().state.action, Action::Run);

        let mut confirmed = None;
        while let Some(event) = physics.recv_blocking() {
            if let PhysicsEvent::PositionUpdated { position, .. } = event {
                confirmed = Some(position);
                break;
            }
        }
        assert_eq!(confirmed, Some(Vector3::new(2.0, 1.7, -3.0)));
        physics.shutdown();
    }
}

/// WEBSOCKET TRANSPORT TESTS
mod websocket_tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::time::sleep;
    use tokio_tungstenite::tungstenite::Message;

    async fn wait_for(conn: &mut Connection, count: usize) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(conn.drain());
            if events.len() >= count {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        events
    }

    /// Text and binary frames decode, garbage is skipped, sends reach the server.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn websocket_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, mut received_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            ws.send(Message::Text(r#"{"type":"assignId","id":11}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"teleport","id":1}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Binary(br#"{"type":"newPlayer","id":"peer"}"#.to_vec()))
                .await
                .unwrap();

            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    received_tx.send(text).unwrap();
                    break;
                }
            }
            ws.close(None).await.unwrap();
        });

        let url = format!("ws://{}", addr);
        let mut conn = Connection::open(&tokio::runtime::Handle::current(), &url);

        let events = wait_for(&mut conn, 3).await;
        assert_eq!(
            events,
            vec![
                ConnectionEvent::Opened,
                ConnectionEvent::Packet(Packet::AssignId {
                    id: PlayerId::Number(11)
                }),
                ConnectionEvent::Packet(Packet::NewPlayer {
                    id: PlayerId::from("peer")
                }),
            ]
        );

        let outgoing = Packet::NeckRotationX {
            id: PlayerId::Number(11),
            neck_rotation_x: 0.25,
        };
        tokio_test::assert_ok!(conn.send(&outgoing));
        let text = received_rx.recv().await.unwrap();
        assert_eq!(Packet::decode(&text).unwrap(), outgoing);
        assert!(text.contains("\"neckRotationX\":0.25"));

        let events = wait_for(&mut conn, 1).await;
        assert_eq!(events, vec![ConnectionEvent::Closed]);
        tokio_test::assert_err!(conn.send(&outgoing));
    }

    /// Connecting to nothing reports a closed connection.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refused_connection_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut conn = Connection::open(&tokio::runtime::Handle::current(), &format!("ws://{}", addr));
        let events = wait_for(&mut conn, 1).await;
        assert_eq!(events, vec![ConnectionEvent::Closed]);
    }
}
