//! Domain Model
//!
//! Identifiers, avatars, generation jobs and the payment provider tag shared by
//! every crate in the workspace.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Chat-platform user that pays for and owns avatars
    BuyerId
);
string_id!(
    /// Avatar identifier (server-assigned, or temporary before upload)
    AvatarId
);
string_id!(
    /// Server-side payment record identifier
    PaymentId
);
string_id!(
    /// Generation job identifier
    JobId
);
string_id!(
    /// Generated asset identifier
    AssetId
);
string_id!(
    /// Pricing tier identifier (e.g. "standard")
    TierId
);

impl AvatarId {
    /// Temporary id used before the server assigns one
    pub fn temporary() -> Self {
        Self(format!("tmp-{}", Uuid::new_v4().simple()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with("tmp-")
    }
}

/// Payment provider tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentProvider {
    /// Card checkout on an external hosted page
    HostedRedirect,
    /// In-platform invoice paid in chat currency
    ChatInvoice,
    /// Transfer signed in an external crypto wallet
    WalletTransfer,
}

impl PaymentProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostedRedirect => "hosted-redirect",
            Self::ChatInvoice => "chat-invoice",
            Self::WalletTransfer => "wallet-transfer",
        }
    }

    /// Maximum age at which a persisted intent for this provider is still actionable
    pub fn freshness_window(self) -> Duration {
        match self {
            // The user leaves the device for a bank page; returning can take a while.
            Self::HostedRedirect => Duration::hours(24),
            Self::ChatInvoice | Self::WalletTransfer => Duration::minutes(5),
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = crate::StudioError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "hosted-redirect" => Ok(Self::HostedRedirect),
            "chat-invoice" => Ok(Self::ChatInvoice),
            "wallet-transfer" => Ok(Self::WalletTransfer),
            other => Err(crate::StudioError::Config(format!(
                "unknown payment provider: {other}"
            ))),
        }
    }
}

/// Avatar lifecycle as reported by the server
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarStatus {
    Draft,
    Processing,
    Ready,
    Failed,
}

/// Avatar owned by a buyer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub id: AvatarId,

    #[serde(default)]
    pub name: Option<String>,

    pub status: AvatarStatus,

    /// Number of reference photos uploaded for training
    #[serde(default)]
    pub reference_photo_count: u32,

    pub created_at: DateTime<Utc>,

    /// Generation job already attached to this avatar, if any
    #[serde(default)]
    pub job_id: Option<JobId>,
}

impl Avatar {
    pub fn is_processing(&self) -> bool {
        self.status == AvatarStatus::Processing
    }

    pub const fn has_references(&self) -> bool {
        self.reference_photo_count > 0
    }
}

/// Generation job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Generation progress counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub completed: u32,
    pub total: u32,
}

/// A generated photo
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Asset identified by its offset within a job
    pub fn at_offset(job_id: &JobId, offset: usize, url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: AssetId::new(format!("{job_id}-{offset}")),
            url: url.into(),
            created_at: now,
        }
    }
}

/// A generation job and the assets received so far
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub job_id: JobId,
    pub avatar_id: AvatarId,
    pub requested_count: u32,
    pub completed: Vec<Asset>,
    pub status: GenerationStatus,
}

impl GenerationJob {
    pub const fn new(job_id: JobId, avatar_id: AvatarId, requested_count: u32) -> Self {
        Self {
            job_id,
            avatar_id,
            requested_count,
            completed: Vec::new(),
            status: GenerationStatus::Processing,
        }
    }

    /// Append the URLs beyond what has already been seen.
    ///
    /// `urls` is the full server-side list; only the tail past the current
    /// length is appended, so a repeated or shorter response adds nothing.
    /// Returns the number of assets appended.
    pub fn append_delta(&mut self, urls: &[String], now: DateTime<Utc>) -> usize {
        let seen = self.completed.len();
        if urls.len() <= seen {
            return 0;
        }
        for (offset, url) in urls.iter().enumerate().skip(seen) {
            self.completed
                .push(Asset::at_offset(&self.job_id, offset, url.clone(), now));
        }
        urls.len() - seen
    }
}
