//! The wire shape of a signed token and its projection to a [`Session`].

use chrono::{DateTime, TimeZone, Utc};
use hearth_core::{FullRole, Role, Session};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub family_id: Uuid,
    pub effective_role: Role,
    pub original_role: FullRole,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn to_session(&self) -> Session {
        Session {
            user_id: self.sub,
            family_id: self.family_id,
            effective_role: self.effective_role,
            original_role: self.original_role,
            issued_at: from_ts(self.iat),
            expires_at: from_ts(self.exp),
            not_before: from_ts(self.nbf),
        }
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}
