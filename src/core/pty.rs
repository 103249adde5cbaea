//! Pseudoterminal facility
//!
//! [`PtyFacility`] spawns a program on a pseudoterminal and hands back a
//! [`PtyProcess`]: a duplex byte channel with resize and kill controls.
//! Output and exit notifications are queued as [`PtyEvent`]s and drained with
//! [`PtyProcess::try_event`] from the event-loop thread, so nothing here ever
//! blocks the caller.
//!
//! [`NativePty`] is the `portable-pty` implementation. It runs two helper
//! threads per process: a reader that forwards output chunks and a supervisor
//! that owns the child, reports its exit and carries out kill requests.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::emulator::GridSize;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open pseudoterminal: {0}")]
    Open(#[source] BoxError),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    Resize(#[source] BoxError),

    #[error("Failed to kill PTY process: {0}")]
    Kill(#[source] io::Error),

    #[error("PTY is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Something the process did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    /// A chunk of output, in the order the process produced it
    Output(Vec<u8>),
    /// The process is gone; exit code when known
    Exited(Option<u32>),
}

/// Everything needed to launch a program on a PTY
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub env: &'a BTreeMap<String, String>,
    pub cwd: &'a Path,
    pub size: GridSize,
    /// Exported to the child as `TERM`
    pub term_name: &'a str,
}

/// Spawns processes on pseudoterminals
pub trait PtyFacility {
    fn spawn(&self, request: &SpawnRequest<'_>) -> Result<Box<dyn PtyProcess>>;
}

/// A running process attached to a pseudoterminal
pub trait PtyProcess {
    /// Write bytes to the process input
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Change the character grid the process sees
    fn resize(&mut self, size: GridSize) -> Result<()>;

    /// Next pending event, if any
    fn try_event(&mut self) -> Option<PtyEvent>;

    /// Ask the process to terminate. Returns without waiting for it.
    fn kill(&mut self) -> Result<()>;

    fn process_id(&self) -> Option<u32>;
}

/// `portable-pty` backed facility
#[derive(Debug, Clone)]
pub struct NativePty {
    /// How often the supervisor checks whether the child is still alive
    poll_interval: Duration,
}

impl Default for NativePty {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl PtyFacility for NativePty {
    fn spawn(&self, request: &SpawnRequest<'_>) -> Result<Box<dyn PtyProcess>> {
        let pair = native_pty_system()
            .openpty(pty_size(request.size))
            .map_err(|e| PtyError::Open(e.into()))?;

        let mut cmd = CommandBuilder::new(request.program);
        cmd.args(request.args);
        cmd.env_clear();
        for (key, value) in request.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", request.term_name);
        cmd.cwd(request.cwd);

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn {
                program: request.program.to_string(),
                source: e.into(),
            })?;
        // The child holds its own copy of the slave side
        drop(pair.slave);

        let endpoints = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match endpoints {
            Ok(endpoints) => endpoints,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PtyError::Open(e.into()));
            }
        };

        let pid = child.process_id();
        debug!(program = request.program, ?pid, "spawned PTY process");

        let (tx, rx) = mpsc::channel();
        let kill_requested = Arc::new(AtomicBool::new(false));

        spawn_reader(reader, tx.clone());
        spawn_supervisor(child, tx, kill_requested.clone(), self.poll_interval);

        Ok(Box::new(NativeProcess {
            master: Some(pair.master),
            writer: Some(writer),
            events: rx,
            kill_requested,
            exited: false,
            pid,
        }))
    }
}

fn pty_size(size: GridSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn spawn_reader(mut reader: Box<dyn Read + Send>, tx: Sender<PtyEvent>) {
    thread::spawn(move || {
        let mut buffer = vec![0u8; 8192];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(PtyEvent::Output(buffer[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // EIO once the slave side is gone
                Err(_) => break,
            }
        }
        trace!("PTY reader finished");
    });
}

fn spawn_supervisor(
    mut child: Box<dyn Child + Send + Sync>,
    tx: Sender<PtyEvent>,
    kill_requested: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    thread::spawn(move || {
        let code = loop {
            if kill_requested.load(Ordering::SeqCst) {
                // SIGHUP, a short grace period, then SIGKILL
                if let Err(e) = child.kill() {
                    warn!(error = %e, "failed to kill PTY process");
                }
                break child.wait().ok().map(|status| status.exit_code());
            }
            match child.try_wait() {
                Ok(Some(status)) => break Some(status.exit_code()),
                Ok(None) => thread::sleep(poll_interval),
                Err(e) => {
                    warn!(error = %e, "lost track of PTY process");
                    break None;
                }
            }
        };
        debug!(?code, "PTY process exited");
        let _ = tx.send(PtyEvent::Exited(code));
    });
}

struct NativeProcess {
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    events: Receiver<PtyEvent>,
    kill_requested: Arc<AtomicBool>,
    exited: bool,
    pid: Option<u32>,
}

impl PtyProcess for NativeProcess {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(PtyError::Closed)?;
        writer.write_all(data).map_err(PtyError::Write)?;
        writer.flush().map_err(PtyError::Write)
    }

    fn resize(&mut self, size: GridSize) -> Result<()> {
        let master = self.master.as_ref().ok_or(PtyError::Closed)?;
        master
            .resize(pty_size(size))
            .map_err(|e| PtyError::Resize(e.into()))
    }

    fn try_event(&mut self) -> Option<PtyEvent> {
        match self.events.try_recv() {
            Ok(event) => {
                if matches!(event, PtyEvent::Exited(_)) {
                    self.exited = true;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.exited {
                    None
                } else {
                    // Both helper threads are gone without reporting an exit
                    self.exited = true;
                    Some(PtyEvent::Exited(None))
                }
            }
        }
    }

    fn kill(&mut self) -> Result<()> {
        self.kill_requested.store(true, Ordering::SeqCst);
        // Closing our side hangs up the terminal
        self.writer = None;
        self.master = None;
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for NativeProcess {
    fn drop(&mut self) {
        self.kill_requested.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_size_has_no_pixels() {
        let size = pty_size(GridSize::new(132, 43));
        assert_eq!(size.cols, 132);
        assert_eq!(size.rows, 43);
        assert_eq!(size.pixel_width, 0);
        assert_eq!(size.pixel_height, 0);
    }

    #[test]
    fn test_spawn_error_names_program() {
        let err = PtyError::Spawn {
            program: "/no/such/shell".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found").into(),
        };
        assert!(err.to_string().contains("/no/such/shell"));
    }
}
