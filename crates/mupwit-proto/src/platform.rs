use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6600;

pub fn data_dir() -> PathBuf {
    // ~/.local/share/mupwit on every unix, not macOS Application Support
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("mupwit")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mupwit")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("mupwit")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mupwit")
    }
}

/// Socket the server creates by default under the user's runtime dir.
pub fn default_socket_path() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        let path = dirs::runtime_dir()?.join("mpd").join("socket");
        path.exists().then_some(path)
    }
    #[cfg(windows)]
    {
        None
    }
}
