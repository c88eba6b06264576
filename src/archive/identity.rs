use crate::archive::record::ItemId;
use regex::Regex;
use std::sync::LazyLock;

/// `<8-digit date>_<11-char item id>` followed by `_` (media) or `.` (sidecar
/// files such as `20230101_abcdefghijk.en.vtt`).
static CANONICAL_DOWNLOAD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{8}_([A-Za-z0-9_-]{11})[_.]").expect("download name regex must compile")
});

pub fn extract_item_id(filename: &str) -> Option<ItemId> {
    let caps = CANONICAL_DOWNLOAD_NAME.captures(filename)?;
    let token = caps.get(1)?.as_str();
    ItemId::parse(token).ok()
}

#[cfg(test)]
mod tests {
    use super::extract_item_id;

    #[test]
    fn extracts_token_at_fixed_offset() {
        let got = extract_item_id("20230101_abcdefghijk_video.mp4").expect("match");
        assert_eq!(got.as_str(), "abcdefghijk");
    }

    #[test]
    fn token_may_contain_hyphen_and_underscore() {
        let got = extract_item_id("20191231_a-b_c-d_e-f_Some Title.mp4").expect("match");
        assert_eq!(got.as_str(), "a-b_c-d_e-f");
    }

    #[test]
    fn subtitle_sidecar_names_match() {
        let got = extract_item_id("20230101_abcdefghijk.en.vtt").expect("match");
        assert_eq!(got.as_str(), "abcdefghijk");
    }

    #[test]
    fn non_matching_names_are_rejected() {
        for name in [
            "abcdefghijk.mp4",
            "channel.id",
            "2023010_abcdefghijk_video.mp4",
            "20230101-abcdefghijk_video.mp4",
            "20230101_abcdefghij_video.mp4",
            "20230101_abcdefghijk",
            "x20230101_abcdefghijk_video.mp4",
            "20230101_abc!efghijk_video.mp4",
        ] {
            assert!(extract_item_id(name).is_none(), "{name} should not match");
        }
    }
}
