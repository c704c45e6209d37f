//! Git-backed snapshot store.
//!
//! The data location is a git working tree. Each project lives in its own
//! JSON file and "what changed since the last run" is the difference between
//! HEAD, the index and the working tree.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use git2::{ErrorCode, Repository, Signature, Status, StatusOptions};
use tempfile::Builder;
use tracing::{debug, error, info};

use crate::domain::ProjectRecord;
use crate::error::DailyReadError;

pub const PLACEHOLDER_FILE: &str = ".empty";
const INITIAL_COMMIT_MESSAGE: &str = "Empty file as a first commit";
const COMMITTER_NAME: &str = "daily-read";
const COMMITTER_EMAIL: &str = "daily-read@localhost";

pub struct VersionedStore {
    root: Utf8PathBuf,
    repo: Repository,
}

impl VersionedStore {
    /// Opens or creates the repository at `root`.
    ///
    /// A repository without commits is given a placeholder commit, but only
    /// when its working tree is clean; otherwise there is no way to tell
    /// which content should become the baseline.
    pub fn init(root: &Utf8Path) -> Result<Self, DailyReadError> {
        if !root.is_absolute() {
            error!("Data location is not an absolute path: {root}");
            return Err(DailyReadError::Configuration(format!(
                "Data location is not an absolute path: {root}"
            )));
        }
        if root.as_std_path().exists() && !root.as_std_path().is_dir() {
            error!("Data location exists but is not a directory: {root}");
            return Err(DailyReadError::Configuration(format!(
                "Data location exists but is not a directory: {root}"
            )));
        }

        fs::create_dir_all(root.as_std_path())
            .map_err(|err| DailyReadError::Filesystem(err.to_string()))?;
        let repo = Repository::init(root.as_std_path())?;
        let store = Self {
            root: root.to_path_buf(),
            repo,
        };

        if !store.has_commits()? {
            store.bootstrap()?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn has_commits(&self) -> Result<bool, DailyReadError> {
        match self.repo.head() {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn bootstrap(&self) -> Result<(), DailyReadError> {
        let mut options = status_options();
        if !self.repo.statuses(Some(&mut options))?.is_empty() {
            error!("Data location {} has no commits but has modifications", self.root);
            return Err(DailyReadError::Consistency(
                "Data location has no commits but has modifications, please commit those or use an empty directory as the data location".to_string(),
            ));
        }

        let placeholder = self.root.join(PLACEHOLDER_FILE);
        fs::File::create(placeholder.as_std_path())
            .map_err(|err| DailyReadError::Filesystem(err.to_string()))?;

        let mut index = self.repo.index()?;
        index.add_path(Utf8Path::new(PLACEHOLDER_FILE).as_std_path())?;
        index.write()?;
        self.commit_index(&mut index, INITIAL_COMMIT_MESSAGE)?;
        info!("Initialised data repository at {}", self.root);
        Ok(())
    }

    /// Paths that differ between the index and HEAD.
    pub fn staged_changes(&self) -> Result<Vec<Utf8PathBuf>, DailyReadError> {
        let head_tree = self.repo.head()?.peel_to_tree()?;
        let mut index = self.repo.index()?;
        index.read(false)?;
        let diff = self
            .repo
            .diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        diff_paths(&diff)
    }

    /// Paths modified in the working tree but not staged. Untracked files are excluded.
    pub fn unstaged_changes(&self) -> Result<Vec<Utf8PathBuf>, DailyReadError> {
        let mut index = self.repo.index()?;
        index.read(false)?;
        let diff = self.repo.diff_index_to_workdir(Some(&index), None)?;
        diff_paths(&diff)
    }

    pub fn untracked_files(&self) -> Result<Vec<Utf8PathBuf>, DailyReadError> {
        let mut options = status_options();
        let statuses = self.repo.statuses(Some(&mut options))?;
        let mut paths = Vec::new();
        for entry in statuses.iter() {
            if !entry.status().contains(Status::WT_NEW) {
                continue;
            }
            if let Some(path) = entry.path() {
                paths.push(Utf8PathBuf::from(path));
            }
        }
        Ok(paths)
    }

    pub fn has_changes(&self) -> Result<bool, DailyReadError> {
        Ok(!self.staged_changes()?.is_empty()
            || !self.unstaged_changes()?.is_empty()
            || !self.untracked_files()?.is_empty())
    }

    /// Union of staged, unstaged and untracked paths, sorted.
    pub fn pending_paths(&self) -> Result<BTreeSet<Utf8PathBuf>, DailyReadError> {
        let mut paths = BTreeSet::new();
        paths.extend(self.staged_changes()?);
        paths.extend(self.unstaged_changes()?);
        paths.extend(self.untracked_files()?);
        Ok(paths)
    }

    pub fn write(&self, record: &ProjectRecord) -> Result<(), DailyReadError> {
        let data = record.data.as_ref().ok_or_else(|| {
            DailyReadError::Validation(format!(
                "no data loaded for project {} from {}",
                record.project_id, record.ngi_node
            ))
        })?;

        let dir = self.root.join(&record.relative_dirpath);
        if dir.as_std_path().exists() && !dir.as_std_path().is_dir() {
            error!("Failed to use data directory {dir}, path exists but is not a directory");
            return Err(DailyReadError::Consistency(format!(
                "Failed to use data directory {dir} for download, path exists but is not a directory."
            )));
        }
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| DailyReadError::Filesystem(err.to_string()))?;

        let path = self.root.join(&record.relative_path);
        if path.parent() != Some(dir.as_path()) {
            error!("Error with paths, dirname of {path} should be {dir}");
            return Err(DailyReadError::Consistency(format!(
                "Error with paths, dirname of {path} should be {dir}"
            )));
        }

        let content = serde_json::to_vec_pretty(data)
            .map_err(|err| DailyReadError::Json(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".daily-read")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| DailyReadError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| DailyReadError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| DailyReadError::Filesystem(err.to_string()))?;
        debug!("Writing data for {} to {path}", record.project_id);
        Ok(())
    }

    /// Returns a copy of `record` with its payload read back from disk.
    pub fn read(&self, record: &ProjectRecord) -> Result<ProjectRecord, DailyReadError> {
        let path = self.root.join(&record.relative_path);
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| DailyReadError::Filesystem(format!("read {path}: {err}")))?;
        let data = serde_json::from_str(&content)
            .map_err(|err| DailyReadError::Json(format!("{path}: {err}")))?;
        let mut loaded = record.clone();
        loaded.set_data(data)?;
        Ok(loaded)
    }

    pub fn exists(&self, record: &ProjectRecord) -> bool {
        self.root.join(&record.relative_path).as_std_path().is_file()
    }

    /// Adds the record's file to the index, or drops it from the index if it was deleted.
    pub fn stage(&self, record: &ProjectRecord) -> Result<(), DailyReadError> {
        let mut index = self.repo.index()?;
        index.read(false)?;
        let relative = record.relative_path.as_std_path();
        if self.exists(record) {
            index.add_path(relative)?;
        } else {
            index.remove_path(relative)?;
        }
        index.write()?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<git2::Oid, DailyReadError> {
        if self.staged_changes()?.is_empty() {
            return Err(DailyReadError::Consistency(
                "nothing staged to commit".to_string(),
            ));
        }
        let mut index = self.repo.index()?;
        index.read(false)?;
        self.commit_index(&mut index, message)
    }

    fn commit_index(
        &self,
        index: &mut git2::Index,
        message: &str,
    ) -> Result<git2::Oid, DailyReadError> {
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now(COMMITTER_NAME, COMMITTER_EMAIL))?;

        let parent = if self.has_commits()? {
            Some(self.repo.head()?.peel_to_commit()?)
        } else {
            None
        };
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        Ok(oid)
    }
}

fn status_options() -> StatusOptions {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    options
}

fn diff_paths(diff: &git2::Diff<'_>) -> Result<Vec<Utf8PathBuf>, DailyReadError> {
    let mut paths = Vec::new();
    for delta in diff.deltas() {
        let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
            continue;
        };
        let path = Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|path| {
            DailyReadError::Consistency(format!("non UTF-8 path in data repository: {}", path.display()))
        })?;
        paths.push(path);
    }
    Ok(paths)
}
