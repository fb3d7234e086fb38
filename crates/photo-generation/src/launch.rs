//! Launch URL hints
//!
//! After an external redirect the app is relaunched with `?resume=1` and,
//! optionally, `buyer_id=<id>` for when the session has not resolved yet.

use photo_core::BuyerId;
use url::Url;

use crate::error::Result;

pub const RESUME_PARAM: &str = "resume";
pub const BUYER_ID_PARAM: &str = "buyer_id";

/// What the launch URL says about resuming
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchContext {
    pub resume: bool,
    pub buyer_hint: Option<BuyerId>,
    /// The launch URL without the resume marker; hosts replace the location
    /// with it so a refresh does not resume twice.
    pub cleaned_url: String,
}

impl LaunchContext {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut url = Url::parse(raw)?;

        let mut resume = false;
        let mut buyer_hint = None;
        let mut kept: Vec<(String, String)> = Vec::new();
        let mut stripped = false;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                RESUME_PARAM => {
                    resume |= is_truthy(&value);
                    stripped = true;
                }
                BUYER_ID_PARAM => {
                    let value = value.trim();
                    if !value.is_empty() {
                        buyer_hint = Some(BuyerId::new(value));
                    }
                    kept.push((BUYER_ID_PARAM.to_string(), value.to_string()));
                }
                _ => kept.push((key.to_string(), value.into_owned())),
            }
        }

        if stripped {
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(&kept);
            }
        }

        Ok(Self {
            resume,
            buyer_hint,
            cleaned_url: url.into(),
        })
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_marker_is_stripped() {
        let ctx = LaunchContext::parse("https://app.example/?tab=gallery&resume=1&buyer_id=42").unwrap();
        assert!(ctx.resume);
        assert_eq!(ctx.buyer_hint, Some(BuyerId::new("42")));
        assert_eq!(ctx.cleaned_url, "https://app.example/?tab=gallery&buyer_id=42");
    }

    #[test]
    fn lone_marker_leaves_no_query() {
        let ctx = LaunchContext::parse("https://app.example/studio?resume=true#top").unwrap();
        assert!(ctx.resume);
        assert_eq!(ctx.buyer_hint, None);
        assert_eq!(ctx.cleaned_url, "https://app.example/studio#top");
    }

    #[test]
    fn plain_launch_is_untouched() {
        let raw = "https://app.example/?tab=gallery";
        let ctx = LaunchContext::parse(raw).unwrap();
        assert!(!ctx.resume);
        assert_eq!(ctx.cleaned_url, raw);
    }

    #[test]
    fn falsy_marker_is_still_stripped() {
        let ctx = LaunchContext::parse("https://app.example/?resume=0").unwrap();
        assert!(!ctx.resume);
        assert_eq!(ctx.cleaned_url, "https://app.example/");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(LaunchContext::parse("not a url").is_err());
    }
}
