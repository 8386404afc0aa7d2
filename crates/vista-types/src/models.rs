use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a notification is about. Stored as lowercase text in the
/// `notifications.kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Follow => "follow",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "follow" => Ok(Self::Follow),
            "message" => Ok(Self::Message),
            other => Err(format!("unknown notification kind '{}'", other)),
        }
    }
}

/// Broad media class; decides which size limit applies on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub const IMAGE_TYPES: &'static [&'static str] =
        &["image/jpeg", "image/png", "image/gif", "image/webp"];
    pub const VIDEO_TYPES: &'static [&'static str] =
        &["video/mp4", "video/quicktime", "video/webm"];

    /// 10 MiB for images, 100 MiB for videos.
    pub fn max_bytes(&self) -> usize {
        match self {
            Self::Image => 10 * 1024 * 1024,
            Self::Video => 100 * 1024 * 1024,
        }
    }

    /// Classify a `Content-Type` value. Parameters such as `; charset=` are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if Self::IMAGE_TYPES.contains(&essence.as_str()) {
            Some(Self::Image)
        } else if Self::VIDEO_TYPES.contains(&essence.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// Public URL under which a stored media object is served.
pub fn media_url(media_id: &str) -> String {
    format!("/media/{}", media_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_classification() {
        assert_eq!(MediaKind::from_content_type("image/png"), Some(MediaKind::Image));
        assert_eq!(
            MediaKind::from_content_type("Video/MP4; codecs=avc1"),
            Some(MediaKind::Video)
        );
        assert_eq!(MediaKind::from_content_type("application/pdf"), None);
    }

    #[test]
    fn notification_kind_parses_its_own_text() {
        for kind in [
            NotificationKind::Like,
            NotificationKind::Comment,
            NotificationKind::Follow,
            NotificationKind::Message,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert!("share".parse::<NotificationKind>().is_err());
    }
}
