use chrono::{DateTime, TimeZone};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// The image just generated.
    Primary,
    /// An entry picked from the history list.
    HistoryItem,
}

impl DownloadKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Primary => "ai_generated",
            Self::HistoryItem => "ai_img",
        }
    }
}

pub fn download_file_name<Tz>(kind: DownloadKind, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.png", kind.prefix(), at.format(STAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};

    use super::{download_file_name, DownloadKind};

    #[test]
    fn names_use_second_granularity_stamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            download_file_name(DownloadKind::Primary, &at),
            "ai_generated_20260307_090502.png"
        );
        assert_eq!(
            download_file_name(DownloadKind::HistoryItem, &at),
            "ai_img_20260307_090502.png"
        );
    }

    #[test]
    fn stamp_uses_the_given_offset() {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = offset.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            download_file_name(DownloadKind::HistoryItem, &at),
            "ai_img_20261231_235959.png"
        );
    }
}
