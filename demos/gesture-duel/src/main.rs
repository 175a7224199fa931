//! Gesture duel: the reference duet application.
//!
//! Targets drift down the (normalized) screen; participants pinch to
//! grab them. First to [`TARGET_SCORE`] grabs wins; if the round clock
//! runs out, the leader wins and a tie is a draw. Hand positions are
//! relayed to the opponent as streaming traffic, excluded from the
//! inactivity watchdog's activity signal.

use std::collections::HashMap;

use duet::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// Grabs needed to win outright.
const TARGET_SCORE: u32 = 5;
/// Round length in seconds.
const ROUND_SECONDS: f32 = 60.0;
/// Seconds between target spawns.
const SPAWN_EVERY: f32 = 2.0;
/// Target fall speed in normalized units per second.
const FALL_SPEED: f32 = 0.15;
/// Pinch-to-target capture radius in normalized units.
const GRAB_RADIUS: f32 = 0.08;
/// Tick cadence.
const TICK_MS: u64 = 50;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Client messages beyond the framework vocabulary. Coordinates are
/// normalized to [0, 1] with y growing downward.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DuelMsg {
    /// Continuous hand-position stream (watchdog-ignored).
    HandPos { x: f32, y: f32 },
    /// A pinch gesture at the given position.
    Pinch { x: f32, y: f32 },
}

// ---------------------------------------------------------------------------
// Round state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct FallingTarget {
    id: u32,
    x: f32,
    y: f32,
}

struct Round {
    targets: Vec<FallingTarget>,
    next_target_id: u32,
    spawn_clock: f32,
    remaining: f32,
    last_whole_second: u32,
    scores: HashMap<ParticipantId, u32>,
}

impl Round {
    fn new(participants: &[Participant]) -> Self {
        Self {
            targets: Vec::new(),
            next_target_id: 0,
            spawn_clock: 0.0,
            remaining: ROUND_SECONDS,
            last_whole_second: ROUND_SECONDS as u32,
            scores: participants.iter().map(|p| (p.id.clone(), 0)).collect(),
        }
    }

    /// Leader by score: `Some` when one participant is strictly ahead.
    fn leader(&self) -> Option<ParticipantId> {
        let mut best: Option<(&ParticipantId, u32)> = None;
        let mut tied = false;
        for (id, score) in &self.scores {
            match best {
                None => best = Some((id, *score)),
                Some((_, top)) if *score > top => {
                    best = Some((id, *score));
                    tied = false;
                }
                Some((_, top)) if *score == top => tied = true,
                _ => {}
            }
        }
        match best {
            Some((id, _)) if !tied => Some(id.clone()),
            _ => None,
        }
    }
}

/// Spawn abscissa for the nth target: the golden-ratio low-discrepancy
/// sequence keeps spawns spread out without a random source.
fn spawn_x(n: u32) -> f32 {
    (n as f32 * 0.618_034).fract()
}

/// Index of the closest target within the grab radius, if any.
fn grabbable(targets: &[FallingTarget], x: f32, y: f32) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, t) in targets.iter().enumerate() {
        let d2 = (t.x - x).powi(2) + (t.y - y).powi(2);
        if d2 <= GRAB_RADIUS * GRAB_RADIUS
            && best.map_or(true, |(_, best_d2)| d2 < best_d2)
        {
            best = Some((i, d2));
        }
    }
    best.map(|(i, _)| i)
}

/// Resolves a round at clock expiry: the leader wins, a tie is a draw.
fn resolve_timeout(round: &Round, roster: &[Participant]) -> SessionEnd {
    match round.leader() {
        Some(id) => {
            let number = roster
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.number)
                .unwrap_or(ParticipantNumber::ONE);
            SessionEnd::timeout().with_winner(id, number)
        }
        None => SessionEnd::timeout(),
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GestureDuel {
    round: Option<Round>,
    roster: Vec<Participant>,
    rounds_played: u32,
    outcome: Option<SessionEnd>,
}

impl AppHooks for GestureDuel {
    type ClientMessage = DuelMsg;

    fn tick_config() -> TickConfig {
        TickConfig::every_ms(TICK_MS)
    }

    fn on_participant_join(&mut self, _participant: &Participant) -> JoinPayloads {
        JoinPayloads::welcome(json!({
            "targetScore": TARGET_SCORE,
            "roundSeconds": ROUND_SECONDS,
        }))
    }

    fn on_participant_leave(&mut self, participant: &Participant, phase: SessionPhase) {
        if phase != SessionPhase::Playing {
            return;
        }
        // Walking out forfeits the round.
        let winner = self.roster.iter().find(|p| p.id != participant.id).cloned();
        self.outcome = Some(match winner {
            Some(w) => SessionEnd::participant_left().with_winner(w.id, w.number),
            None => SessionEnd::participant_left(),
        });
    }

    fn on_session_start(&mut self, participants: &[Participant]) {
        self.roster = participants.to_vec();
        self.round = Some(Round::new(participants));
        tracing::info!(round = self.rounds_played + 1, "round started");
    }

    fn on_message(
        &mut self,
        message: DuelMsg,
        sender: &ParticipantId,
        phase: SessionPhase,
    ) -> Vec<Outbound> {
        match message {
            DuelMsg::HandPos { x, y } => vec![Outbound::to_opponent(json!({
                "type": "opponent_hand",
                "x": x,
                "y": y,
            }))],
            DuelMsg::Pinch { x, y } => {
                if phase != SessionPhase::Playing {
                    return Vec::new();
                }
                let Some(round) = self.round.as_mut() else {
                    return Vec::new();
                };
                let Some(index) = grabbable(&round.targets, x, y) else {
                    return vec![Outbound::to_sender(json!({ "type": "pinch_missed" }))];
                };

                let target = round.targets.swap_remove(index);
                let entry = round.scores.entry(sender.clone()).or_insert(0);
                *entry += 1;
                let score = *entry;
                if score >= TARGET_SCORE {
                    let number = self
                        .roster
                        .iter()
                        .find(|p| &p.id == sender)
                        .map(|p| p.number)
                        .unwrap_or(ParticipantNumber::ONE);
                    self.outcome = Some(SessionEnd::won(sender.clone(), number));
                }
                vec![Outbound::to_all(json!({
                    "type": "target_grabbed",
                    "targetId": target.id,
                    "participantId": sender.as_str(),
                    "score": score,
                }))]
            }
        }
    }

    fn on_tick(&mut self, dt: f64) -> Vec<Value> {
        let Some(round) = self.round.as_mut() else {
            return Vec::new();
        };
        let dt = dt as f32;
        let mut out = Vec::new();

        round.remaining -= dt;
        if round.remaining <= 0.0 {
            self.outcome = Some(resolve_timeout(round, &self.roster));
            return out;
        }

        round.spawn_clock += dt;
        while round.spawn_clock >= SPAWN_EVERY {
            round.spawn_clock -= SPAWN_EVERY;
            let target = FallingTarget {
                id: round.next_target_id,
                x: spawn_x(round.next_target_id),
                y: 0.0,
            };
            round.next_target_id += 1;
            out.push(json!({
                "type": "target_spawned",
                "targetId": target.id,
                "x": target.x,
            }));
            round.targets.push(target);
        }

        for target in &mut round.targets {
            target.y += FALL_SPEED * dt;
        }
        let grounded: Vec<u32> =
            round.targets.iter().filter(|t| t.y >= 1.0).map(|t| t.id).collect();
        round.targets.retain(|t| t.y < 1.0);
        for id in grounded {
            out.push(json!({ "type": "target_missed", "targetId": id }));
        }

        // One clock message per whole second, not per tick.
        let whole = round.remaining.ceil() as u32;
        if whole != round.last_whole_second {
            round.last_whole_second = whole;
            out.push(json!({ "type": "clock", "remaining": whole }));
        }

        out
    }

    fn check_session_end(&mut self) -> Option<SessionEnd> {
        let outcome = self.outcome.take()?;
        self.round = None;
        Some(outcome)
    }

    fn on_reset(&mut self) -> Option<Value> {
        self.rounds_played += 1;
        self.round = None;
        Some(json!({ "round": self.rounds_played + 1 }))
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = ServerConfig::from_env();
    // Hand positions stream continuously; they must not keep an
    // otherwise idle session alive.
    config.monitor = config.monitor.ignore_kind("hand_pos");

    let server = DuetServer::builder()
        .config(config)
        .build(GestureDuel::default())
        .await?;
    tracing::info!(addr = %server.local_addr()?, "gesture-duel session server up");
    server.run().await?;
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================
