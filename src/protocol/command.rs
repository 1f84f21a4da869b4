#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    DetectEncoding,
    ExtractDialogue,
    MatchFiles,
    AnalyzePair,
    Scan,
    ScanCancel,
    ConfigOpen,
    ConfigSave,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "detect_encoding" | "encoding.detect" => Command::DetectEncoding,
            "extract_dialogue" => Command::ExtractDialogue,
            "match_files" => Command::MatchFiles,
            "analyze_pair" => Command::AnalyzePair,
            "scan" => Command::Scan,
            "scan.cancel" => Command::ScanCancel,
            "config.open" => Command::ConfigOpen,
            "config.save" => Command::ConfigSave,
            _ => Command::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(Command::from("encoding.detect"), Command::DetectEncoding);
        assert_eq!(Command::from("detect_encoding"), Command::DetectEncoding);
        assert_eq!(Command::from("scan.cancel"), Command::ScanCancel);
        assert_eq!(Command::from("translate"), Command::Unknown);
    }
}
