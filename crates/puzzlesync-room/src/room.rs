//! Room actor: an isolated Tokio task that owns one puzzle document.
//!
//! Each room runs in its own task, communicating with the outside world
//! through a bounded mpsc mailbox. Joins, leaves, and operations are all
//! commands in that mailbox, so they are applied one at a time in arrival
//! order. That single queue is what makes versions gapless and gives every
//! member the same sequence of updates.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use puzzlesync_protocol::{ErrorReason, Role, RoomId, ServerMessage};
use puzzlesync_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::{PuzzleLogic, RoomConfig, RoomError, RoomRegistry, RoomState};

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// An outbound message from the room actor to a member's connection.
///
/// Documents are shared between all members' queues through an `Arc`;
/// broadcasting never copies the document.
pub enum RoomOutbound<P: PuzzleLogic> {
    /// Current state, sent on join and on resync.
    Snapshot {
        document: Arc<P::Document>,
        version: u64,
    },
    /// State after an accepted operation.
    Update {
        document: Arc<P::Document>,
        version: u64,
    },
    /// An operation from this member was refused.
    Rejected(Rejection),
}

impl<P: PuzzleLogic> Clone for RoomOutbound<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Snapshot { document, version } => Self::Snapshot {
                document: Arc::clone(document),
                version: *version,
            },
            Self::Update { document, version } => Self::Update {
                document: Arc::clone(document),
                version: *version,
            },
            Self::Rejected(r) => Self::Rejected(r.clone()),
        }
    }
}

impl<P: PuzzleLogic> RoomOutbound<P> {
    /// The wire message for this outbound, borrowing the document.
    pub fn to_message(&self) -> ServerMessage<&P::Document> {
        match self {
            Self::Snapshot { document, version } => ServerMessage::Snapshot {
                document: document.as_ref(),
                version: *version,
            },
            Self::Update { document, version } => ServerMessage::Update {
                document: document.as_ref(),
                version: *version,
            },
            Self::Rejected(r) => ServerMessage::error(r.reason(), r.message.clone()),
        }
    }
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The member's role is below what the operation requires.
    Forbidden,
    /// The puzzle refused the operation itself.
    Invalid,
}

/// A refused operation. Delivered to the originating member only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl Rejection {
    /// The client-facing reason code.
    pub fn reason(&self) -> ErrorReason {
        match self.kind {
            RejectionKind::Forbidden => ErrorReason::Forbidden,
            RejectionKind::Invalid => ErrorReason::InvalidOperation,
        }
    }
}

/// Result of an operation that reached the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The document was replaced; `version` is the new version.
    Accepted { version: u64 },
    /// Nothing changed. The rejection was also queued to the originator.
    Rejected(Rejection),
}

/// Channel sender for delivering outbound messages to a member.
pub type MemberSender<P> = mpsc::Sender<RoomOutbound<P>>;

/// Channel receiver a connection drains. When it yields `None` the room
/// has dropped the member (it fell behind) or the room has stopped.
pub type MemberReceiver<P> = mpsc::Receiver<RoomOutbound<P>>;

/// Creates a member channel sized for this puzzle's rooms.
pub fn member_channel<P: PuzzleLogic>() -> (MemberSender<P>, MemberReceiver<P>) {
    mpsc::channel(P::room_config().member_buffer.max(1))
}

/// One connection's membership in a room.
pub struct Member<P: PuzzleLogic> {
    pub conn_id: ConnectionId,
    pub display_name: String,
    pub role: Role,
    pub sender: MemberSender<P>,
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

/// Commands sent to a room actor through its mailbox.
///
/// The `oneshot::Sender` in each variant is a "reply channel": the
/// caller sends a command and waits for the response on it. A dropped
/// reply channel means the actor stopped before answering.
pub(crate) enum RoomCommand<P: PuzzleLogic> {
    Join {
        member: Member<P>,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        conn_id: ConnectionId,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Apply {
        conn_id: ConnectionId,
        op: P::Operation,
        reply: oneshot::Sender<Result<ApplyOutcome, RoomError>>,
    },
    Resync {
        conn_id: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
}

/// A snapshot of room metadata (not the document itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub state: RoomState,
    /// Number of accepted operations since the room was created.
    pub version: u64,
    pub member_count: usize,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone: an `mpsc::Sender`, the room id, and the instance
/// number the registry uses to tell a room apart from its successors.
pub struct RoomHandle<P: PuzzleLogic> {
    room_id: RoomId,
    instance: u64,
    sender: mpsc::Sender<RoomCommand<P>>,
}

impl<P: PuzzleLogic> Clone for RoomHandle<P> {
    fn clone(&self) -> Self {
        Self {
            room_id: self.room_id.clone(),
            instance: self.instance,
            sender: self.sender.clone(),
        }
    }
}

impl<P: PuzzleLogic> std::fmt::Debug for RoomHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("room_id", &self.room_id)
            .field("instance", &self.instance)
            .finish()
    }
}

impl<P: PuzzleLogic> RoomHandle<P> {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Distinguishes this room from earlier or later rooms with the same
    /// id.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Adds a member. On success a snapshot is already queued on the
    /// member's channel.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyJoined`] if the connection id is present
    /// - [`RoomError::Unavailable`] if the room has been evicted
    pub async fn join(&self, member: Member<P>) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join { member, reply })
            .await?
    }

    /// Removes a member and returns how many remain.
    pub async fn leave(&self, conn_id: ConnectionId) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Leave { conn_id, reply })
            .await?
    }

    /// Applies an operation on behalf of a member.
    pub async fn apply(
        &self,
        conn_id: ConnectionId,
        op: P::Operation,
    ) -> Result<ApplyOutcome, RoomError> {
        self.request(|reply| RoomCommand::Apply { conn_id, op, reply })
            .await?
    }

    /// Queues a fresh snapshot to one member.
    pub async fn resync(&self, conn_id: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Resync { conn_id, reply })
            .await?
    }

    /// Requests the current room info.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand<P>,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<P: PuzzleLogic> {
    room_id: RoomId,
    instance: u64,
    state: RoomState,
    document: Arc<P::Document>,
    version: u64,
    members: HashMap<ConnectionId, Member<P>>,
    registry: Weak<RoomRegistry<P>>,
    receiver: mpsc::Receiver<RoomCommand<P>>,
    empty_grace: Duration,
}

impl<P: PuzzleLogic> RoomActor<P> {
    /// Runs the actor loop until the room empties out.
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, instance = self.instance, "room actor started");

        loop {
            let next = if self.members.is_empty() {
                match tokio::time::timeout(self.empty_grace, self.receiver.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!(room_id = %self.room_id, "no member joined in time");
                        self.evict().await;
                        break;
                    }
                }
            } else {
                self.receiver.recv().await
            };
            let Some(cmd) = next else { break };

            let read_only = matches!(cmd, RoomCommand::Info { .. });
            match cmd {
                RoomCommand::Join { member, reply } => {
                    let result = self.handle_join(member);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { conn_id, reply } => {
                    let result = self.handle_leave(conn_id);
                    let _ = reply.send(result);
                }
                RoomCommand::Apply { conn_id, op, reply } => {
                    let result = self.handle_apply(conn_id, op);
                    let _ = reply.send(result);
                }
                RoomCommand::Resync { conn_id, reply } => {
                    let result = self.handle_resync(conn_id);
                    let _ = reply.send(result);
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(self.info());
                }
            }

            if !read_only && self.members.is_empty() {
                self.evict().await;
                break;
            }
        }

        tracing::info!(room_id = %self.room_id, instance = self.instance, "room actor stopped");
    }

    fn handle_join(&mut self, member: Member<P>) -> Result<(), RoomError> {
        if self.members.contains_key(&member.conn_id) {
            return Err(RoomError::AlreadyJoined(
                member.conn_id,
                self.room_id.clone(),
            ));
        }

        let conn_id = member.conn_id;
        tracing::info!(
            room_id = %self.room_id,
            %conn_id,
            display_name = %member.display_name,
            role = %member.role,
            members = self.members.len() + 1,
            "member joined"
        );
        self.members.insert(conn_id, member);
        self.state = RoomState::Active;
        self.send_to(conn_id, self.snapshot());
        Ok(())
    }

    fn handle_leave(&mut self, conn_id: ConnectionId) -> Result<usize, RoomError> {
        if self.members.remove(&conn_id).is_none() {
            return Err(RoomError::NotMember(conn_id, self.room_id.clone()));
        }
        tracing::info!(
            room_id = %self.room_id,
            %conn_id,
            members = self.members.len(),
            "member left"
        );
        Ok(self.members.len())
    }

    fn handle_apply(
        &mut self,
        conn_id: ConnectionId,
        op: P::Operation,
    ) -> Result<ApplyOutcome, RoomError> {
        let role = match self.members.get(&conn_id) {
            Some(member) => member.role,
            None => return Err(RoomError::NotMember(conn_id, self.room_id.clone())),
        };

        let required = P::required_role(&op);
        if !role.satisfies(required) {
            tracing::debug!(room_id = %self.room_id, %conn_id, %role, %required, "operation forbidden");
            return Ok(self.reject(
                conn_id,
                Rejection {
                    kind: RejectionKind::Forbidden,
                    message: format!("operation requires role {required}"),
                },
            ));
        }

        match P::apply(&self.document, op) {
            Ok(next) => {
                self.document = Arc::new(next);
                self.version += 1;
                tracing::debug!(room_id = %self.room_id, %conn_id, version = self.version, "operation applied");
                self.broadcast(RoomOutbound::Update {
                    document: Arc::clone(&self.document),
                    version: self.version,
                });
                Ok(ApplyOutcome::Accepted {
                    version: self.version,
                })
            }
            Err(reason) => {
                tracing::debug!(room_id = %self.room_id, %conn_id, %reason, "operation invalid");
                Ok(self.reject(
                    conn_id,
                    Rejection {
                        kind: RejectionKind::Invalid,
                        message: reason,
                    },
                ))
            }
        }
    }

    fn handle_resync(&mut self, conn_id: ConnectionId) -> Result<(), RoomError> {
        if !self.members.contains_key(&conn_id) {
            return Err(RoomError::NotMember(conn_id, self.room_id.clone()));
        }
        self.send_to(conn_id, self.snapshot());
        Ok(())
    }

    fn reject(&mut self, conn_id: ConnectionId, rejection: Rejection) -> ApplyOutcome {
        self.send_to(conn_id, RoomOutbound::Rejected(rejection.clone()));
        ApplyOutcome::Rejected(rejection)
    }

    fn snapshot(&self) -> RoomOutbound<P> {
        RoomOutbound::Snapshot {
            document: Arc::clone(&self.document),
            version: self.version,
        }
    }

    /// Queues `msg` to every member. Never waits.
    fn broadcast(&mut self, msg: RoomOutbound<P>) {
        let mut dropped = Vec::new();
        for (conn_id, member) in &self.members {
            if !Self::deliver(member, msg.clone()) {
                dropped.push(*conn_id);
            }
        }
        for conn_id in dropped {
            self.drop_member(conn_id);
        }
    }

    /// Queues `msg` to one member. Never waits.
    fn send_to(&mut self, conn_id: ConnectionId, msg: RoomOutbound<P>) {
        let delivered = match self.members.get(&conn_id) {
            Some(member) => Self::deliver(member, msg),
            None => return,
        };
        if !delivered {
            self.drop_member(conn_id);
        }
    }

    /// Returns `false` if the member must be dropped.
    fn deliver(member: &Member<P>, msg: RoomOutbound<P>) -> bool {
        match member.sender.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %member.conn_id, "member outbound buffer full, dropping member");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Removes a member without its cooperation. Dropping its sender
    /// closes the channel, which is how its connection learns about it.
    fn drop_member(&mut self, conn_id: ConnectionId) {
        if self.members.remove(&conn_id).is_some() {
            tracing::info!(
                room_id = %self.room_id,
                %conn_id,
                members = self.members.len(),
                "member dropped"
            );
        }
    }

    async fn evict(&mut self) {
        self.state = RoomState::Empty;
        self.receiver.close();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_instance(&self.room_id, self.instance).await;
        }
        tracing::info!(room_id = %self.room_id, instance = self.instance, version = self.version, "room evicted");
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            state: self.state,
            version: self.version,
            member_count: self.members.len(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// The mailbox is bounded by `config.mailbox_size`; callers wait when it
/// is full.
pub(crate) fn spawn_room<P: PuzzleLogic>(
    room_id: RoomId,
    instance: u64,
    config: &RoomConfig,
    registry: Weak<RoomRegistry<P>>,
) -> RoomHandle<P> {
    let (tx, rx) = mpsc::channel(config.mailbox_size.max(1));

    let actor = RoomActor::<P> {
        room_id: room_id.clone(),
        instance,
        state: RoomState::Empty,
        document: Arc::new(P::initial_document()),
        version: 0,
        members: HashMap::new(),
        registry,
        receiver: rx,
        empty_grace: config.empty_grace,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        instance,
        sender: tx,
    }
}
