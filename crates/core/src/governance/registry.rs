use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditSink, TracingAuditSink};
use crate::domain::playbook::{
    Playbook, PlaybookId, PlaybookStatus, PlaybookVersionRef, ScopeKey,
};
use crate::errors::GovernanceError;
use crate::governance::record_outcome;

/// All versions, the current pointer and the pins of one playbook.
#[derive(Clone, Debug, Default)]
pub(crate) struct Lineage {
    pub(crate) versions: BTreeMap<u32, Arc<Playbook>>,
    pub(crate) current: Option<u32>,
    pub(crate) pins: BTreeMap<ScopeKey, u32>,
}

impl Lineage {
    pub(crate) fn version(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<&Arc<Playbook>, GovernanceError> {
        self.versions.get(&version).ok_or_else(|| {
            GovernanceError::version_not_found(&PlaybookVersionRef {
                playbook_id: playbook_id.clone(),
                version,
            })
        })
    }

    pub(crate) fn latest_version(&self) -> Option<u32> {
        self.versions.keys().next_back().copied()
    }

    pub(crate) fn pinned_scopes(&self, version: u32) -> Vec<ScopeKey> {
        self.pins
            .iter()
            .filter(|(_, pinned)| **pinned == version)
            .map(|(scope, _)| scope.clone())
            .collect()
    }

    /// Stored playbooks are never edited; a status change stores a new value.
    pub(crate) fn replace_status(&mut self, version: u32, status: PlaybookStatus) {
        if let Some(existing) = self.versions.get(&version) {
            let updated = Arc::new(existing.with_status(status));
            self.versions.insert(version, updated);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: u32,
    pub status: PlaybookStatus,
    pub is_current: bool,
    pub pinned_scopes: Vec<ScopeKey>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageSnapshot {
    pub playbook_id: PlaybookId,
    pub versions: Vec<Playbook>,
    pub current_version: Option<u32>,
    #[serde(default)]
    pub pins: BTreeMap<ScopeKey, u32>,
}

/// Logical persistence shape of the registry, for external stores.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub playbooks: Vec<LineageSnapshot>,
}

type SharedLineage = Arc<RwLock<Lineage>>;

/// Catalog of playbook versions keyed by `(playbook_id, version)`.
///
/// Each playbook has its own lock: mutations of one playbook are serialized
/// and observed atomically by resolves, while other playbooks proceed
/// independently.
pub struct PlaybookRegistry {
    lineages: RwLock<HashMap<PlaybookId, SharedLineage>>,
    sink: Arc<dyn AuditSink>,
}

impl PlaybookRegistry {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { lineages: RwLock::new(HashMap::new()), sink }
    }

    pub fn register(&self, playbook: Playbook) -> Result<PlaybookVersionRef, GovernanceError> {
        self.register_with_context(playbook, &AuditContext::system("playbook-registry"))
    }

    /// Inserts a new DRAFT version. Versions must increase per playbook.
    pub fn register_with_context(
        &self,
        playbook: Playbook,
        audit: &AuditContext,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        let playbook_id = playbook.playbook_id.clone();
        let version = playbook.version_ref();
        let result = self.insert_draft(playbook);
        record_outcome(
            self.sink.as_ref(),
            audit,
            &playbook_id,
            AuditCategory::Registry,
            "version_registered",
            &result,
            &[("version", version.version.to_string())],
        );
        result
    }

    fn insert_draft(&self, playbook: Playbook) -> Result<PlaybookVersionRef, GovernanceError> {
        let version = playbook.version_ref();
        if playbook.status != PlaybookStatus::Draft {
            let exists = self
                .read_lineage(&playbook.playbook_id, |lineage| {
                    Ok(lineage.versions.contains_key(&playbook.version))
                })
                .unwrap_or(false);
            if exists {
                return Err(GovernanceError::DuplicateVersion(version));
            }
            return Err(GovernanceError::InvalidTransition {
                version,
                from: playbook.status,
                to: PlaybookStatus::Draft,
            });
        }

        let lineage = self.lineage_or_insert(&playbook.playbook_id);
        let mut lineage = write(&lineage);
        if lineage.versions.contains_key(&playbook.version) {
            return Err(GovernanceError::DuplicateVersion(version));
        }
        if let Some(latest) = lineage.latest_version().filter(|latest| *latest > playbook.version) {
            return Err(GovernanceError::Validation {
                playbook_id: playbook.playbook_id.clone(),
                issues: vec![format!(
                    "version {} is lower than the latest registered version {latest}",
                    playbook.version
                )],
            });
        }

        lineage.versions.insert(playbook.version, Arc::new(playbook));
        Ok(version)
    }

    pub fn fork_draft(
        &self,
        playbook_id: &PlaybookId,
        from_version: u32,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        self.fork_draft_with_context(
            playbook_id,
            from_version,
            &AuditContext::system("playbook-registry"),
        )
    }

    /// Copies an existing version into the next DRAFT version; the only edit path.
    pub fn fork_draft_with_context(
        &self,
        playbook_id: &PlaybookId,
        from_version: u32,
        audit: &AuditContext,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        let result = self.update_lineage(playbook_id, |lineage| {
            let source = lineage.version(playbook_id, from_version)?;
            let latest = lineage.latest_version().unwrap_or(from_version);
            let next = latest.checked_add(1).ok_or_else(|| GovernanceError::Validation {
                playbook_id: playbook_id.clone(),
                issues: vec![format!("no version number is available after {latest}")],
            })?;
            let draft = source.as_version(next);
            let version = draft.version_ref();
            if lineage.versions.contains_key(&next) {
                return Err(GovernanceError::DuplicateVersion(version));
            }
            lineage.versions.insert(next, Arc::new(draft));
            Ok(version)
        });
        record_outcome(
            self.sink.as_ref(),
            audit,
            playbook_id,
            AuditCategory::Registry,
            "draft_forked",
            &result,
            &[("from_version", from_version.to_string())],
        );
        result
    }

    /// Pinned version for the scope, else the current version.
    pub fn resolve(
        &self,
        playbook_id: &PlaybookId,
        scope_key: Option<&ScopeKey>,
    ) -> Result<Arc<Playbook>, GovernanceError> {
        self.read_lineage(playbook_id, |lineage| {
            let pinned = scope_key.and_then(|scope| lineage.pins.get(scope));
            let version = pinned.or(lineage.current.as_ref()).copied().ok_or_else(|| {
                GovernanceError::NotFound(format!(
                    "playbook `{playbook_id}` has no current or pinned version"
                ))
            })?;
            lineage.version(playbook_id, version).cloned()
        })
    }

    pub fn get(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<Arc<Playbook>, GovernanceError> {
        self.read_lineage(playbook_id, |lineage| lineage.version(playbook_id, version).cloned())
    }

    pub fn current_version(&self, playbook_id: &PlaybookId) -> Option<u32> {
        self.read_lineage(playbook_id, |lineage| Ok(lineage.current)).ok().flatten()
    }

    pub fn list_versions(
        &self,
        playbook_id: &PlaybookId,
    ) -> Result<Vec<VersionSummary>, GovernanceError> {
        self.read_lineage(playbook_id, |lineage| {
            Ok(lineage
                .versions
                .iter()
                .map(|(version, playbook)| VersionSummary {
                    version: *version,
                    status: playbook.status,
                    is_current: lineage.current == Some(*version),
                    pinned_scopes: lineage.pinned_scopes(*version),
                })
                .collect())
        })
    }

    /// Active pins for the playbook, keyed by scope.
    pub fn pins_for(
        &self,
        playbook_id: &PlaybookId,
    ) -> Result<BTreeMap<ScopeKey, u32>, GovernanceError> {
        self.read_lineage(playbook_id, |lineage| Ok(lineage.pins.clone()))
    }

    pub fn playbook_ids(&self) -> Vec<PlaybookId> {
        let mut ids: Vec<PlaybookId> = read(&self.lineages).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let playbooks = self
            .playbook_ids()
            .into_iter()
            .filter_map(|playbook_id| {
                self.read_lineage(&playbook_id, |lineage| {
                    Ok(LineageSnapshot {
                        playbook_id: playbook_id.clone(),
                        versions: lineage
                            .versions
                            .values()
                            .map(|playbook| playbook.as_ref().clone())
                            .collect(),
                        current_version: lineage.current,
                        pins: lineage.pins.clone(),
                    })
                })
                .ok()
            })
            .collect();
        RegistrySnapshot { playbooks }
    }

    /// Rebuilds a registry from persisted state, rejecting inconsistent pointers and pins.
    pub fn from_snapshot(
        snapshot: RegistrySnapshot,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, GovernanceError> {
        let mut lineages = HashMap::new();
        for entry in snapshot.playbooks {
            if lineages.contains_key(&entry.playbook_id) {
                return Err(GovernanceError::Validation {
                    playbook_id: entry.playbook_id.clone(),
                    issues: vec![format!(
                        "playbook `{}` appears in more than one lineage",
                        entry.playbook_id
                    )],
                });
            }
            let playbook_id = entry.playbook_id.clone();
            let lineage = restore_lineage(entry)?;
            lineages.insert(playbook_id, Arc::new(RwLock::new(lineage)));
        }
        Ok(Self { lineages: RwLock::new(lineages), sink })
    }

    pub(crate) fn update_lineage<T>(
        &self,
        playbook_id: &PlaybookId,
        update: impl FnOnce(&mut Lineage) -> Result<T, GovernanceError>,
    ) -> Result<T, GovernanceError> {
        let lineage = self.lineage(playbook_id)?;
        let mut guard = write(&lineage);
        update(&mut guard)
    }

    fn read_lineage<T>(
        &self,
        playbook_id: &PlaybookId,
        inspect: impl FnOnce(&Lineage) -> Result<T, GovernanceError>,
    ) -> Result<T, GovernanceError> {
        let lineage = self.lineage(playbook_id)?;
        let guard = read(&lineage);
        inspect(&guard)
    }

    fn lineage(&self, playbook_id: &PlaybookId) -> Result<SharedLineage, GovernanceError> {
        read(&self.lineages)
            .get(playbook_id)
            .cloned()
            .ok_or_else(|| GovernanceError::playbook_not_found(playbook_id))
    }

    fn lineage_or_insert(&self, playbook_id: &PlaybookId) -> SharedLineage {
        if let Some(existing) = read(&self.lineages).get(playbook_id) {
            return existing.clone();
        }
        write(&self.lineages).entry(playbook_id.clone()).or_default().clone()
    }
}

impl Default for PlaybookRegistry {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

fn restore_lineage(entry: LineageSnapshot) -> Result<Lineage, GovernanceError> {
    let mut issues = Vec::new();
    let mut lineage = Lineage::default();

    for playbook in entry.versions {
        if playbook.playbook_id != entry.playbook_id {
            issues.push(format!(
                "version {} belongs to playbook `{}`",
                playbook.version, playbook.playbook_id
            ));
            continue;
        }
        if lineage.versions.contains_key(&playbook.version) {
            issues.push(format!("version {} appears more than once", playbook.version));
            continue;
        }
        lineage.versions.insert(playbook.version, Arc::new(playbook));
    }

    if let Some(current) = entry.current_version {
        match lineage.versions.get(&current).map(|playbook| playbook.status) {
            Some(PlaybookStatus::Promoted) => lineage.current = Some(current),
            Some(status) => issues.push(format!("current version {current} is {status}")),
            None => issues.push(format!("current version {current} does not exist")),
        }
    }

    for (scope, version) in entry.pins {
        match lineage.versions.get(&version).map(|playbook| playbook.status) {
            Some(PlaybookStatus::Retired) => {
                issues.push(format!("scope `{scope}` is pinned to retired version {version}"))
            }
            Some(_) => {
                lineage.pins.insert(scope, version);
            }
            None => issues.push(format!("scope `{scope}` is pinned to missing version {version}")),
        }
    }

    if issues.is_empty() {
        Ok(lineage)
    } else {
        Err(GovernanceError::Validation { playbook_id: entry.playbook_id, issues })
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
