//! Jobs sent to the upload worker and the tickets handed back to callers.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures_channel::oneshot;

use crate::render_state::{
    backend::{MeshData, MeshHandle},
    sections::SectionId,
};

/// A unit of work for the upload worker. Jobs run strictly in submission order.
#[derive(Debug)]
pub enum UploadJob {
    /// Turn `mesh` into a backend handle for `section`.
    Upload {
        /// Section the mesh belongs to.
        section: SectionId,
        /// Geometry to upload.
        mesh: MeshData,
        /// Receives the handle, or `None` for "no mesh".
        reply: oneshot::Sender<Option<MeshHandle>>,
    },
    /// Release the live handle of `section`, if any.
    Remove {
        /// Section whose mesh is released.
        section: SectionId,
    },
    /// Signals `reply` once every earlier job has run.
    Flush {
        /// Signalled when the job runs.
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum TicketState {
    Resolved(Option<MeshHandle>),
    Pending(oneshot::Receiver<Option<MeshHandle>>),
}

/// The eventual result of an upload: the new handle, or `None` for "no mesh".
///
/// `UploadTicket` is a [`Future`]; synchronous call sites can [`wait`](Self::wait) on it
/// instead. A ticket whose job is dropped without running (for example during teardown)
/// resolves to `None`.
#[derive(Debug)]
pub struct UploadTicket {
    state: TicketState,
}

impl UploadTicket {
    /// A ticket that is already settled.
    pub fn resolved(handle: Option<MeshHandle>) -> Self {
        Self {
            state: TicketState::Resolved(handle),
        }
    }

    pub(crate) fn pending(receiver: oneshot::Receiver<Option<MeshHandle>>) -> Self {
        Self {
            state: TicketState::Pending(receiver),
        }
    }

    /// Blocks the calling thread until the upload settles.
    pub fn wait(self) -> Option<MeshHandle> {
        pollster::block_on(self)
    }

    /// The result if the upload has already settled, without blocking.
    pub fn try_result(&mut self) -> Option<Option<MeshHandle>> {
        let settled = match &mut self.state {
            TicketState::Resolved(handle) => return Some(*handle),
            TicketState::Pending(receiver) => match receiver.try_recv() {
                Ok(Some(handle)) => handle,
                Ok(None) => return None,
                Err(oneshot::Canceled) => None,
            },
        };
        self.state = TicketState::Resolved(settled);
        Some(settled)
    }
}

impl Future for UploadTicket {
    type Output = Option<MeshHandle>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            TicketState::Resolved(handle) => Poll::Ready(*handle),
            TicketState::Pending(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(handle)) => Poll::Ready(handle),
                Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
