use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::{ProjectRecord, portal_id_from_path};
use crate::error::DailyReadError;
use crate::sources::{ProjectMap, ProjectSource, sources_from_config};
use crate::store::VersionedStore;

/// Runs the facility sources and keeps their records in the versioned store.
///
/// Fetching and saving are two ordered phases: `get_data` must succeed
/// before `save_data` is called.
pub struct DataMaster {
    sources: Vec<Box<dyn ProjectSource>>,
    store: VersionedStore,
    data: ProjectMap,
    data_fetched: bool,
    data_saved: bool,
}

impl DataMaster {
    pub fn new(config: &Config, sources: Vec<Box<dyn ProjectSource>>) -> Result<Self, DailyReadError> {
        let store = VersionedStore::init(&config.data_location)?;
        Ok(Self {
            sources,
            store,
            data: ProjectMap::new(),
            data_fetched: false,
            data_saved: false,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, DailyReadError> {
        let sources = sources_from_config(config)?;
        Self::new(config, sources)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    pub fn records(&self) -> &ProjectMap {
        &self.data
    }

    pub fn insert_record(&mut self, record: ProjectRecord) {
        self.data.insert(record.project_id.clone(), record);
    }

    pub fn is_fetched(&self) -> bool {
        self.data_fetched
    }

    pub fn is_saved(&self) -> bool {
        self.data_saved
    }

    pub fn get_data(&mut self) -> Result<(), DailyReadError> {
        for source in &self.sources {
            match source.get_data(None) {
                Ok(records) => self.data.extend(records),
                Err(err) => {
                    error!("Failed to fetch data from {}: {err}", source.name());
                    return Err(err);
                }
            }
        }
        self.data_fetched = true;
        Ok(())
    }

    /// Writes every fetched record to `<node>/<year>/<portal_id>.json`.
    ///
    /// # Panics
    ///
    /// If called before [`DataMaster::get_data`].
    pub fn save_data(&mut self) -> Result<(), DailyReadError> {
        assert!(self.data_fetched, "save_data called before get_data");

        if self.store.has_changes()? {
            warn!("Changes for projects detected from previous run!");
            for record in self.modified_or_new_projects()? {
                warn!(
                    "{} from {} had changes not yet reported.",
                    record.project_id, record.ngi_node
                );
            }
        }

        for record in self.data.values() {
            self.store.write(record)?;
        }
        info!("Saved {} projects to {}", self.data.len(), self.store.root());
        self.data_saved = true;
        Ok(())
    }

    pub fn any_modified_or_new(&self) -> Result<bool, DailyReadError> {
        self.store.has_changes()
    }

    /// Staged, unstaged and untracked projects.
    ///
    /// Projects fetched in this run come back with their data; anything else
    /// is a path-only record.
    pub fn modified_or_new_projects(&self) -> Result<Vec<ProjectRecord>, DailyReadError> {
        let mut projects = Vec::new();
        for path in self.store.pending_paths()? {
            let portal_id = portal_id_from_path(&path);
            if let Some(record) = self.data.get(&portal_id) {
                projects.push(record.clone());
                continue;
            }
            match ProjectRecord::from_path(path.clone()) {
                Ok(record) => projects.push(record),
                Err(_) => debug!("Ignoring non-project path {path}"),
            }
        }
        Ok(projects)
    }

    pub fn unique_orderers(records: &[ProjectRecord]) -> BTreeSet<String> {
        records
            .iter()
            .filter_map(|record| record.orderer.clone())
            .collect()
    }

    pub fn load_payload(&self, record: &ProjectRecord) -> Result<ProjectRecord, DailyReadError> {
        self.store.read(record)
    }

    pub fn stage(&self, record: &ProjectRecord) -> Result<(), DailyReadError> {
        self.store.stage(record)
    }

    pub fn commit(&self, message: &str) -> Result<git2::Oid, DailyReadError> {
        self.store.commit(message)
    }
}
