/// Scripted multi-replica editing sessions
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use textsync::{
    CollaboratorId, DocumentSnapshot, LoopbackRelay, OperationKind, OutboundReceiver,
    SessionConfig, SessionHandle, SessionId,
};
use tracing::{debug, info};

/// A simulation script, loaded from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub initial: String,
    pub replicas: Vec<ReplicaSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One scripted action; nothing reaches other replicas until a `deliver` step or the
/// final flush
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Insert {
        replica: String,
        position: usize,
        text: String,
    },
    Delete {
        replica: String,
        position: usize,
        length: usize,
    },
    /// Whole-buffer edit, as an editor would report it
    Replace { replica: String, content: String },
    Cursor { replica: String, offset: usize },
    Deliver {
        replica: String,
        #[serde(default)]
        count: Option<usize>,
    },
    Undo { replica: String },
    Redo { replica: String },
}

impl Step {
    fn replica(&self) -> &str {
        match self {
            Step::Insert { replica, .. }
            | Step::Delete { replica, .. }
            | Step::Replace { replica, .. }
            | Step::Cursor { replica, .. }
            | Step::Deliver { replica, .. }
            | Step::Undo { replica }
            | Step::Redo { replica } => replica,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicaReport {
    pub id: String,
    pub snapshot: DocumentSnapshot,
    pub conflicts: usize,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub replicas: Vec<ReplicaReport>,
    pub messages: usize,
}

impl Report {
    pub fn converged(&self) -> bool {
        self.replicas
            .windows(2)
            .all(|pair| pair[0].snapshot == pair[1].snapshot)
    }
}

struct Replica {
    session: SessionHandle,
    outbound: OutboundReceiver,
}

pub fn run(script: &Script, config: &SessionConfig) -> Result<Report> {
    if script.replicas.is_empty() {
        bail!("script declares no replicas");
    }

    let session_id = SessionId::new();
    let mut relay = LoopbackRelay::new();
    let mut replicas = Vec::with_capacity(script.replicas.len());
    for spec in &script.replicas {
        let id = CollaboratorId::new(spec.id.as_str());
        relay.register(id.clone());
        let name = spec.name.clone().unwrap_or_else(|| spec.id.clone());
        let (session, outbound) = SessionHandle::open(
            session_id,
            id,
            name,
            DocumentSnapshot::new(script.initial.as_str(), 0),
            config.clone(),
        )?;
        replicas.push(Replica { session, outbound });
    }
    info!(
        "Simulating {} replicas over {} steps",
        replicas.len(),
        script.steps.len()
    );

    for (index, step) in script.steps.iter().enumerate() {
        let target = replicas
            .iter()
            .position(|r| r.session.local_id().as_str() == step.replica())
            .with_context(|| format!("step {}: unknown replica '{}'", index, step.replica()))?;

        debug!("Step {}: {:?}", index, step);
        let session = &mut replicas[target].session;
        match step {
            Step::Insert { position, text, .. } => {
                session.submit_operation(OperationKind::insert(*position, text.as_str()))?;
            }
            Step::Delete {
                position, length, ..
            } => {
                session.submit_operation(OperationKind::delete(*position, *length))?;
            }
            Step::Replace { content, .. } => {
                session.submit_local_edit(content, None, None)?;
            }
            Step::Cursor { offset, .. } => {
                session.move_cursor(*offset)?;
            }
            Step::Undo { .. } => {
                if !session.undo()? {
                    debug!("Step {}: nothing to undo", index);
                }
            }
            Step::Redo { .. } => {
                if !session.redo()? {
                    debug!("Step {}: nothing to redo", index);
                }
            }
            Step::Deliver { count, .. } => {
                collect(&mut relay, &mut replicas);
                relay
                    .deliver(&mut replicas[target].session, *count)
                    .with_context(|| format!("step {}: delivery failed", index))?;
            }
        }
    }

    // Everything still in transit arrives eventually
    loop {
        collect(&mut relay, &mut replicas);
        let quiet = replicas
            .iter()
            .all(|r| relay.pending_for(r.session.local_id()) == 0);
        if quiet {
            break;
        }
        for replica in replicas.iter_mut() {
            relay.deliver(&mut replica.session, None)?;
        }
    }

    Ok(Report {
        messages: relay.len(),
        replicas: replicas
            .iter()
            .map(|r| ReplicaReport {
                id: r.session.local_id().to_string(),
                snapshot: r.session.document_snapshot(),
                conflicts: r.session.recent_conflicts().len(),
            })
            .collect(),
    })
}

fn collect(relay: &mut LoopbackRelay, replicas: &mut [Replica]) {
    for replica in replicas.iter_mut() {
        let id = replica.session.local_id().clone();
        relay.collect(&id, &mut replica.outbound);
    }
}
