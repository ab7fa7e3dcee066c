//! Locally remembered dismissed ads.
//!
//! Stored as a JSON array of ids in the platform data directory. This is a
//! per-device preference only; the server never sees it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{debug, warn};
use uuid::Uuid;

use scriptshop_shared::records::Ad;

use crate::error::{ClientError, Result};

const FILE_NAME: &str = "dismissed_ads.json";

#[derive(Debug)]
pub struct DismissedAds {
    path: PathBuf,
    ids: HashSet<Uuid>,
}

impl DismissedAds {
    /// `<data dir>/dismissed_ads.json` for this application.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "Sfaxien", "ScriptShop").ok_or_else(|| {
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no home directory for application data",
            ))
        })?;
        Ok(dirs.data_dir().join(FILE_NAME))
    }

    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path()?)
    }

    /// A missing file is an empty set; an unreadable one is logged and
    /// treated as empty.
    pub fn load(path: &Path) -> Result<Self> {
        let ids = match std::fs::read(path) {
            Ok(raw) => match serde_json::from_slice::<Vec<Uuid>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt dismissed-ads file");
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            ids,
        })
    }

    pub fn is_dismissed(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn dismiss(&mut self, id: Uuid) -> Result<()> {
        if self.ids.insert(id) {
            self.save()?;
            debug!(ad = %id, "Ad dismissed");
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ids.clear();
        self.save()
    }

    /// Ads still to show, in their original order.
    pub fn visible(&self, ads: Vec<Ad>) -> Vec<Ad> {
        ads.into_iter().filter(|ad| !self.is_dismissed(ad.id)).collect()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut ids: Vec<&Uuid> = self.ids.iter().collect();
        ids.sort();
        std::fs::write(&self.path, serde_json::to_vec(&ids)?)?;
        Ok(())
    }
}
