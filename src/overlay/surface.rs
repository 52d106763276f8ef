use eyre::WrapErr;
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::broadcast;

/// One mutation of the overlay page. The page maps each operation onto the
/// element it targets: `#username`, `.number`, `#message`, `.container`,
/// `.team-logo`, or the `--team-color` property of the document root.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SurfaceOp {
    SetUsername { text: String },
    SetNumber { value: u32 },
    SetTeamColor { color: String },
    SetTeamLogo { url: String },
    /// Already escaped, safe to assign as inner HTML.
    SetMessageHtml { html: String },
    /// Plain text for `aria-label`, never parsed as HTML.
    SetMessageLabel { label: String },
    SetOpacity { value: f32 },
    PlaySound { url: String, volume: f32 },
}

impl SurfaceOp {
    fn kind(&self) -> &'static str {
        match self {
            SurfaceOp::SetUsername { .. } => "username",
            SurfaceOp::SetNumber { .. } => "number",
            SurfaceOp::SetTeamColor { .. } => "team_color",
            SurfaceOp::SetTeamLogo { .. } => "team_logo",
            SurfaceOp::SetMessageHtml { .. } => "message_html",
            SurfaceOp::SetMessageLabel { .. } => "message_label",
            SurfaceOp::SetOpacity { .. } => "opacity",
            SurfaceOp::PlaySound { .. } => "sound",
        }
    }

    /// Whether a page attaching later should still see this operation.
    fn is_state(&self) -> bool {
        !matches!(self, SurfaceOp::PlaySound { .. })
    }
}

/// Where the presenter writes the card.
pub trait Surface {
    fn apply(&self, op: SurfaceOp) -> Result<(), eyre::Report>;
}

/// Fans surface operations out to every attached overlay page as JSON.
///
/// The latest state-carrying operation of each kind is kept so a page that
/// attaches (or reloads) mid-display starts from the current card.
#[derive(Clone)]
pub struct OverlayHub {
    tx: broadcast::Sender<String>,
    snapshot: Arc<Mutex<BTreeMap<&'static str, String>>>,
}

impl OverlayHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            snapshot: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Attaches a page: the current card followed by every later operation.
    pub fn subscribe(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let rx = self.tx.subscribe();
        let snapshot = self.snapshot.lock().values().cloned().collect();
        (snapshot, rx)
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Surface for OverlayHub {
    fn apply(&self, op: SurfaceOp) -> Result<(), eyre::Report> {
        let json = serde_json::to_string(&op).wrap_err("Failed to serialize surface operation")?;
        if op.is_state() {
            self.snapshot.lock().insert(op.kind(), json.clone());
        }
        if self.tx.send(json).is_err() {
            tracing::trace!("No overlay page attached, {} kept for later", op.kind());
        }
        Ok(())
    }
}
