use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a stored or submitted enum label is not recognised.
#[derive(Debug, Error)]
#[error("unknown {kind} value: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed set of lowercase text labels stored in TEXT columns.
/// Generates `as_str`, `Display`, `FromStr` and `TryFrom<String>` (used by sqlx `try_from`).
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_enum!(
    /// Kind of VPN management backend a plan is sold for and a server runs.
    ServerKind, "server kind" {
        TokenPanel => "token_panel",
        PeerPanel => "peer_panel",
    }
);

impl ServerKind {
    pub const ALL: [ServerKind; 2] = [ServerKind::TokenPanel, ServerKind::PeerPanel];

    /// Whether usage on this backend kind is metered and enforced by the quota monitor.
    pub fn is_metered(&self) -> bool {
        matches!(self, ServerKind::PeerPanel)
    }

    /// Prefix of the account names created on this backend kind.
    pub fn account_prefix(&self) -> &'static str {
        match self {
            ServerKind::TokenPanel => "user",
            ServerKind::PeerPanel => "wg_user",
        }
    }
}

text_enum!(
    PaymentMethod, "payment method" {
        Card => "card",
        Crypto => "crypto",
    }
);

text_enum!(
    /// Settlement state of an order. `pending` is the only non-terminal state.
    PaymentStatus, "payment status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    SubscriptionStatus, "subscription status" {
        Active => "active",
        ProvisionFailed => "provision_failed",
        LimitReached => "limit_reached",
        Expired => "expired",
    }
);

/// Number of bytes in one gibibyte, the unit plans express their data allowance in.
pub const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Converts a plan allowance in GB into bytes. Non-positive allowances mean unlimited and yield 0.
pub fn gb_to_bytes(gb: f64) -> i64 {
    if gb > 0.0 { (gb * BYTES_PER_GB) as i64 } else { 0 }
}
