//! Master bootstrap: storage root, system catalog, and shutdown.

use crate::options::MasterOptions;
use crate::sys_catalog::{SysCatalog, SYS_CATALOG_TABLET_ID};
use std::path::Path;
use std::sync::Arc;
use tessera_commons::error::Result;
use tessera_commons::ids::TabletId;
use tessera_consensus::resolver::PeerUuidResolver;
use tessera_store::fs_manager::FsManager;

/// One master process: the storage root plus the system catalog it hosts.
pub struct Master {
    fs: Arc<FsManager>,
    options: MasterOptions,
    catalog: SysCatalog,
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("options", &self.options)
            .finish()
    }
}

impl Master {
    /// Brings a master up on `fs_root`: opens or initializes the storage
    /// root, creates or loads the catalog tablet, and blocks until its
    /// consensus is running.
    pub fn start(
        fs_root: impl AsRef<Path>,
        options: MasterOptions,
        resolver: Arc<dyn PeerUuidResolver>,
    ) -> Result<Master> {
        let fs = Arc::new(FsManager::open_or_create(fs_root)?);
        let catalog = SysCatalog::new(Arc::clone(&fs), options.clone(), resolver)?;

        let catalog_exists = fs
            .tablet_metadata_path(&TabletId::new(SYS_CATALOG_TABLET_ID))
            .exists();
        if catalog_exists {
            catalog.load()?;
        } else {
            catalog.create_new()?;
        }
        catalog.wait_until_running()?;

        Ok(Master {
            fs,
            options,
            catalog,
        })
    }

    pub fn fs(&self) -> &Arc<FsManager> {
        &self.fs
    }

    pub fn options(&self) -> &MasterOptions {
        &self.options
    }

    pub fn catalog(&self) -> &SysCatalog {
        &self.catalog
    }

    pub fn shutdown(&self) {
        self.catalog.shutdown();
    }
}
