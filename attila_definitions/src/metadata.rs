use chrono::{DateTime, Utc};

/// Server-managed timestamps attached to every stored entity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Metadata {
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Metadata {
    pub fn new() -> Metadata {
        let now = Utc::now();
        Metadata {
            create_time: now,
            update_time: now,
        }
    }
}

impl Default for Metadata {
    fn default() -> Metadata {
        Metadata::new()
    }
}
