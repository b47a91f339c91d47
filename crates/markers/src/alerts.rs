use foundation::ids::{MarkerId, UserId};

use crate::marker::Marker;

const DEFAULT_TITLE: &str = "Marker Alert";
const DEFAULT_DESCRIPTION: &str = "No description";
const DEFAULT_ADDRESS: &str = "No Address";

/// Read-only view of a marker for the alerts list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: MarkerId,
    pub title: String,
    pub description: String,
    pub address: String,
    pub image_url: Option<String>,
    pub created_at: String,
    pub owner_id: UserId,
}

fn or_default(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl From<&Marker> for Alert {
    fn from(m: &Marker) -> Self {
        Self {
            id: m.id.clone(),
            title: or_default(&m.title, DEFAULT_TITLE),
            description: or_default(&m.description, DEFAULT_DESCRIPTION),
            address: or_default(m.address.as_deref().unwrap_or_default(), DEFAULT_ADDRESS),
            image_url: m.image_url.clone(),
            created_at: m.created_at.clone(),
            owner_id: m.owner_id.clone(),
        }
    }
}

/// Projects markers into alerts, newest `created_at` first.
///
/// `created_at` stamps are RFC 3339 UTC, so string order is time order.
/// Ties keep mirror order.
pub fn alerts_from(markers: &[Marker]) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = markers.iter().map(Alert::from).collect();
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts
}
