use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::record::SortKey;
use crate::session::DEFAULT_REFRESH;

#[derive(Serialize, Deserialize)]
pub struct Config {
    pub sort: SortKey,
    pub refresh: f64,
    pub lite: bool,
}

impl Config {
    pub fn load() -> Config {
        let path = get_home_config();
        if path.exists() {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if let Ok(config) = toml::from_str::<Config>(&contents) {
                    return config;
                }
            }
        }

        //default
        Config {
            sort: SortKey::Mem,
            refresh: DEFAULT_REFRESH,
            lite: false,
        }
    }

    pub fn save(&self) {
        let path = get_home_config();
        if let Ok(toml_str) = toml::to_string(self) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(path, toml_str);
        }
    }
}

fn get_home_config() -> PathBuf {
    //home directory
    if let Some(mut dir) = dirs::home_dir() {
        dir.push(".config");
        dir.push("apptop");
        dir.push("config.toml");
        return dir;
    }
    //should not happen, but just in case
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config {
            sort: SortKey::Swap,
            refresh: 3.5,
            lite: true,
        };
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.sort, SortKey::Swap);
        assert!((back.refresh - 3.5).abs() < 1e-9);
        assert!(back.lite);
    }

    #[test]
    fn sort_key_serializes_lowercase() {
        let text = toml::to_string(&Config {
            sort: SortKey::Cpu,
            refresh: 2.0,
            lite: false,
        })
        .unwrap();
        assert!(text.contains("sort = \"cpu\""));
    }
}
