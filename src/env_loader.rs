use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(config_home: Option<PathBuf>, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    match config_home {
        Some(home) => Some(home.join(".env")),
        None => Some(config_dir?.join("ta-migrate/.env")),
    }
}

/// Load `.env` from the working directory, else from the config home
/// (`TA_MIGRATE_HOME`, then the platform config dir).
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("TA_MIGRATE_HOME").map(PathBuf::from),
        dirs::config_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn explicit_home_wins() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/ta")),
            Some(PathBuf::from("/home/alice/.config")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/ta/.env")));
    }

    #[test]
    fn falls_back_to_config_dir() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice/.config")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/.config/ta-migrate/.env")));
    }

    #[test]
    fn nothing_without_any_base() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
