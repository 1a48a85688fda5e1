//! Secondary cursors returned by stored procedure calls.
//!
//! These live outside the statement registry. Transaction boundaries do not
//! touch them; they are closed together when the connection closes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::{ErrorInfo, Session, StatementHandle, handle_failure};

#[derive(Debug)]
pub struct OutResultSet {
    handle: Mutex<Option<Box<dyn StatementHandle>>>,
    server_handle: i32,
}

impl OutResultSet {
    pub(crate) fn new(handle: Box<dyn StatementHandle>) -> Arc<Self> {
        let server_handle = handle.server_handle();
        Arc::new(Self {
            handle: Mutex::new(Some(handle)),
            server_handle,
        })
    }

    pub const fn server_handle(&self) -> i32 {
        self.server_handle
    }

    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }

    pub(crate) fn close(&self, session: &mut dyn Session) -> Option<ErrorInfo> {
        let mut handle = self.handle.lock().take()?;
        handle.close(session);
        handle_failure(session)
    }
}

#[derive(Debug, Default)]
pub(crate) struct OutResultSetRegistry {
    cursors: Vec<Arc<OutResultSet>>,
}

impl OutResultSetRegistry {
    pub fn add(&mut self, cursor: Arc<OutResultSet>) {
        self.cursors.push(cursor);
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn take_all(&mut self) -> Vec<Arc<OutResultSet>> {
        std::mem::take(&mut self.cursors)
    }
}
