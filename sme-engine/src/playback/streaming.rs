//! Streaming loop
//!
//! [`PlaybackEngine::tick`] is one presentation step: present the unit that
//! is current at the wall-clock-derived media time, evict old units, and run a
//! quota-bounded buffer-ahead pass.
//!
//! [`spawn_engine`] moves an engine onto its own task that ticks at
//! `tick_interval_ms` and serves [`EngineHandle`] commands between ticks.
//! Seek and load requests bump the supersede generation before they are
//! queued, so a pass that is running when they arrive drops its output.

use crate::error::{Error, Result};
use crate::media::{BufferedUnit, LoadResult, MediaInput, OutputSink};
use crate::playback::buffer::BufferRange;
use crate::playback::engine::{EngineStatus, PlaybackEngine};
use crate::playback::perf::{Counter, PerfStats};
use crate::playback::pipeline::{Delivered, PassReport, SupersedeSignal};
use crate::playback::state::PlaybackState;
use sme_common::events::{EngineEvent, StateTag};
use sme_common::time::TIME_EPSILON;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, trace, Instrument};
use uuid::Uuid;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing; nothing was done
    Inactive,
    Playing {
        position: f64,
        report: Option<PassReport>,
    },
    /// Presentation reached the end of the track this tick
    Ended { duration: f64 },
}

impl PlaybackEngine {
    /// Advance presentation by one step
    pub async fn tick(&mut self) -> TickOutcome {
        let strict = !self.config.stale_fallback();
        let retention = self.config.retention_secs;

        let PlaybackState::Playing(loaded) = &mut self.state else {
            return TickOutcome::Inactive;
        };
        let now = loaded.timing.current_time();
        let duration = loaded.duration();

        if duration > 0.0 && now >= duration - TIME_EPSILON {
            return self.finish_playback(duration);
        }

        // A unit that contains `now` wins; otherwise keep a live-delivered
        // unit that is still current before falling back to a stale one.
        let found = loaded.buffer.find_at(now, strict);
        let present = match found {
            Some(unit) if unit.contains(now) => Some(unit.clone()),
            _ if self.delivered.covers(now) => None,
            Some(unit) => Some(unit.clone()),
            None => None,
        };

        match present {
            Some(unit) if self.delivered.is_unit(unit.timestamp) => {}
            Some(unit) => {
                if let Some(sink) = self.sink.as_mut() {
                    sink.deliver(Some(&unit));
                    self.perf.count(Counter::DeliveredUnit);
                }
                trace!("Presented unit at {:.3}s (now {:.3}s)", unit.timestamp, now);
                self.delivered = Delivered::for_unit(&unit);
            }
            None if self.delivered.covers(now) || self.delivered == Delivered::Gap => {}
            None => {
                if let Some(sink) = self.sink.as_mut() {
                    sink.deliver(None);
                }
                debug!("Nothing to present at {:.3}s", now);
                self.delivered = Delivered::Gap;
            }
        }

        loaded.buffer.trim_before(now, retention);

        let report = self.run_buffer_ahead(now, Some(now)).await;
        TickOutcome::Playing {
            position: now,
            report,
        }
    }

    /// Playing → paused at the end of the track; `Ended` fires once
    fn finish_playback(&mut self, duration: f64) -> TickOutcome {
        if let PlaybackState::Playing(mut loaded) = std::mem::take(&mut self.state) {
            loaded.timing.freeze_at(duration);
            self.set_state(StateTag::Playing, PlaybackState::Paused(loaded));
        }
        if !self.ended_notified {
            self.ended_notified = true;
            info!("Reached end of track ({:.3}s)", duration);
            self.events.ended(duration);
        }
        TickOutcome::Ended { duration }
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Load { input, reply } => {
                let _ = reply.send(self.load(input).await);
            }
            EngineCommand::Play {
                start_time,
                speed,
                reply,
            } => {
                self.play(start_time, speed).await;
                let _ = reply.send(());
            }
            EngineCommand::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            EngineCommand::Seek { time, reply } => {
                self.seek(time).await;
                let _ = reply.send(());
            }
            EngineCommand::SetSpeed { speed, reply } => {
                self.set_speed(speed);
                let _ = reply.send(());
            }
            EngineCommand::PointAtTime { time, reply } => {
                let _ = reply.send(self.point_at_time(time).await);
            }
            EngineCommand::SetOutputSink { sink, reply } => {
                self.set_output_sink(sink);
                let _ = reply.send(());
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineCommand::PerfStats { reply } => {
                let _ = reply.send(self.perf_stats());
            }
            EngineCommand::ResetPerfStats { reply } => {
                self.reset_perf_stats();
                let _ = reply.send(());
            }
            EngineCommand::Unload { reply } => {
                self.unload();
                let _ = reply.send(());
            }
            EngineCommand::Shutdown { reply } => {
                self.unload();
                let _ = reply.send(());
            }
        }
    }
}

/// Requests served by the driver task
pub enum EngineCommand {
    Load {
        input: MediaInput,
        reply: oneshot::Sender<Result<LoadResult>>,
    },
    Play {
        start_time: f64,
        speed: f64,
        reply: oneshot::Sender<()>,
    },
    Pause {
        reply: oneshot::Sender<f64>,
    },
    Seek {
        time: f64,
        reply: oneshot::Sender<()>,
    },
    SetSpeed {
        speed: f64,
        reply: oneshot::Sender<()>,
    },
    PointAtTime {
        time: f64,
        reply: oneshot::Sender<Option<BufferedUnit>>,
    },
    SetOutputSink {
        sink: Option<Box<dyn OutputSink>>,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    PerfStats {
        reply: oneshot::Sender<PerfStats>,
    },
    ResetPerfStats {
        reply: oneshot::Sender<()>,
    },
    Unload {
        reply: oneshot::Sender<()>,
    },
    /// Unload and stop the driver task
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to an engine running under [`spawn_engine`]
#[derive(Clone)]
pub struct EngineHandle {
    id: Uuid,
    tx: mpsc::Sender<EngineCommand>,
    supersede: SupersedeSignal,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::EngineStopped)?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    pub async fn load(&self, input: MediaInput) -> Result<LoadResult> {
        self.supersede.bump();
        self.request(|reply| EngineCommand::Load { input, reply })
            .await?
    }

    pub async fn play(&self, start_time: f64, speed: f64) -> Result<()> {
        self.request(|reply| EngineCommand::Play {
            start_time,
            speed,
            reply,
        })
        .await
    }

    pub async fn pause(&self) -> Result<f64> {
        self.request(|reply| EngineCommand::Pause { reply }).await
    }

    pub async fn seek(&self, time: f64) -> Result<()> {
        self.supersede.bump();
        self.request(|reply| EngineCommand::Seek { time, reply })
            .await
    }

    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        self.request(|reply| EngineCommand::SetSpeed { speed, reply })
            .await
    }

    pub async fn point_at_time(&self, time: f64) -> Result<Option<BufferedUnit>> {
        self.request(|reply| EngineCommand::PointAtTime { time, reply })
            .await
    }

    pub async fn set_output_sink(&self, sink: Option<Box<dyn OutputSink>>) -> Result<()> {
        self.request(|reply| EngineCommand::SetOutputSink { sink, reply })
            .await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(|reply| EngineCommand::Status { reply }).await
    }

    pub async fn state(&self) -> Result<StateTag> {
        Ok(self.status().await?.state)
    }

    pub async fn current_time(&self) -> Result<f64> {
        Ok(self.status().await?.position)
    }

    pub async fn duration(&self) -> Result<f64> {
        Ok(self.status().await?.duration)
    }

    pub async fn buffer_range(&self) -> Result<BufferRange> {
        Ok(self.status().await?.buffer_range)
    }

    pub async fn perf_stats(&self) -> Result<PerfStats> {
        self.request(|reply| EngineCommand::PerfStats { reply })
            .await
    }

    pub async fn reset_perf_stats(&self) -> Result<()> {
        self.request(|reply| EngineCommand::ResetPerfStats { reply })
            .await
    }

    pub async fn unload(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Unload { reply }).await
    }

    /// Unload and stop the driver task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Shutdown { reply })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Run `engine` on its own task.
///
/// The task ends on [`EngineHandle::shutdown`] or when every handle is dropped.
pub fn spawn_engine(engine: PlaybackEngine) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let handle = EngineHandle {
        id: engine.id,
        tx,
        supersede: engine.pipeline.generation().clone(),
        events: engine.events.sender(),
    };
    let span = info_span!("engine", id = %engine.id);
    let task = tokio::spawn(drive(engine, rx).instrument(span));
    (handle, task)
}

async fn drive(mut engine: PlaybackEngine, mut rx: mpsc::Receiver<EngineCommand>) {
    let mut ticker = tokio::time::interval(engine.config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Engine driver started");

    loop {
        tokio::select! {
            biased;

            command = rx.recv() => match command {
                Some(EngineCommand::Shutdown { reply }) => {
                    engine.unload();
                    let _ = reply.send(());
                    break;
                }
                Some(command) => engine.handle_command(command).await,
                None => {
                    debug!("All engine handles dropped");
                    engine.unload();
                    break;
                }
            },
            _ = ticker.tick() => {
                engine.tick().await;
            }
        }
    }

    info!("Engine driver stopped");
}
