//! Scripted PTY facility for headless tests
//!
//! Every spawn gets its own [`ProcessHandle`]; tests push output and exit
//! events into it and inspect what the session wrote, resized and killed.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use super::emulator::GridSize;
use super::pty::{PtyError, PtyEvent, PtyFacility, PtyProcess, Result, SpawnRequest};

/// Owned copy of a [`SpawnRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnRecord {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub size: GridSize,
    pub term_name: String,
}

#[derive(Debug, Default)]
pub struct ProcessLog {
    pub request: SpawnRecord,
    pub writes: Vec<Vec<u8>>,
    pub resizes: Vec<GridSize>,
    pub kills: usize,
    pub events: VecDeque<PtyEvent>,
    pub fail_kill: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessHandle(Rc<RefCell<ProcessLog>>);

impl ProcessHandle {
    pub fn emit_output(&self, bytes: &[u8]) {
        self.0
            .borrow_mut()
            .events
            .push_back(PtyEvent::Output(bytes.to_vec()));
    }

    pub fn emit_exit(&self, code: Option<u32>) {
        self.0.borrow_mut().events.push_back(PtyEvent::Exited(code));
    }

    pub fn fail_kill(&self) {
        self.0.borrow_mut().fail_kill = true;
    }

    pub fn log(&self) -> Ref<'_, ProcessLog> {
        self.0.borrow()
    }

    /// Everything written to the process, concatenated
    pub fn input(&self) -> Vec<u8> {
        self.0.borrow().writes.concat()
    }
}

#[derive(Debug, Default)]
struct FakeInner {
    processes: Vec<ProcessHandle>,
    fail_spawn: bool,
}

/// Fake [`PtyFacility`]; clones share the same process list
#[derive(Debug, Clone, Default)]
pub struct FakePty {
    inner: Rc<RefCell<FakeInner>>,
}

impl FakePty {
    pub fn new() -> Self {
        Self::default()
    }

    /// A facility whose every spawn fails as if the shell did not exist
    pub fn failing() -> Self {
        let fake = Self::default();
        fake.set_fail_spawn(true);
        fake
    }

    pub fn set_fail_spawn(&self, fail: bool) {
        self.inner.borrow_mut().fail_spawn = fail;
    }

    pub fn spawn_count(&self) -> usize {
        self.inner.borrow().processes.len()
    }

    pub fn process(&self, index: usize) -> ProcessHandle {
        self.inner.borrow().processes[index].clone()
    }

    pub fn last(&self) -> ProcessHandle {
        let inner = self.inner.borrow();
        inner.processes[inner.processes.len() - 1].clone()
    }
}

impl PtyFacility for FakePty {
    fn spawn(&self, request: &SpawnRequest<'_>) -> Result<Box<dyn PtyProcess>> {
        if self.inner.borrow().fail_spawn {
            return Err(PtyError::Spawn {
                program: request.program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory")
                    .into(),
            });
        }
        let handle = ProcessHandle::default();
        handle.0.borrow_mut().request = SpawnRecord {
            program: request.program.to_string(),
            args: request.args.to_vec(),
            env: request.env.clone(),
            cwd: request.cwd.to_path_buf(),
            size: request.size,
            term_name: request.term_name.to_string(),
        };
        self.inner.borrow_mut().processes.push(handle.clone());
        Ok(Box::new(FakeProcess {
            handle,
            exited: false,
        }))
    }
}

struct FakeProcess {
    handle: ProcessHandle,
    exited: bool,
}

impl PtyProcess for FakeProcess {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.exited {
            return Err(PtyError::Closed);
        }
        self.handle.0.borrow_mut().writes.push(data.to_vec());
        Ok(())
    }

    fn resize(&mut self, size: GridSize) -> Result<()> {
        if self.exited {
            return Err(PtyError::Closed);
        }
        self.handle.0.borrow_mut().resizes.push(size);
        Ok(())
    }

    fn try_event(&mut self) -> Option<PtyEvent> {
        let event = self.handle.0.borrow_mut().events.pop_front()?;
        if matches!(event, PtyEvent::Exited(_)) {
            self.exited = true;
        }
        Some(event)
    }

    fn kill(&mut self) -> Result<()> {
        let mut log = self.handle.0.borrow_mut();
        log.kills += 1;
        if log.fail_kill {
            return Err(PtyError::Kill(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Operation not permitted",
            )));
        }
        self.exited = true;
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        Some(4242)
    }
}
