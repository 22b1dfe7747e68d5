//! The mesh patching pipeline.
//!
//! [`PatchPipeline`] drives one complete run over a populated [`DataDirectory`].
//!
//! # Patch Algorithm
//!
//! 1. Reject an output directory inside the data directory, then merge the
//!    configuration (bundled default, overlay documents, user file).
//! 2. Discover meshes with the mesh discovery rules, minus the mesh blocklist.
//! 3. Scan textures by suffix, parse every mesh in parallel to observe the slots
//!    its textures are used in, then classify every texture.
//! 4. Load PBR documents and build the per-run [`PatcherContext`].
//! 5. Pre-pass: collect the matches of every shape and gather the mods that
//!    compete with another mod on some shape. The [`ModOrderResolver`] decides
//!    their order; a changed order is saved to the user file.
//! 6. Patch every mesh in parallel. Per shape: collect matches, pick the winner
//!    by mod priority, run an attached transform (falling back to the source
//!    family when it fails), resize the texture set and apply the patch.
//! 7. Meshes that changed are written under the output directory and recorded in
//!    the [`DiffRecord`].

use crate::config::{ConfigLoader, PatcherConfig};
use crate::diff::DiffRecord;
use crate::error::{Error, Result};
use crate::image::{DdsImageService, ImageService};
use crate::output::check_output_dir;
use crate::patchers::{
    load_pbr_entries, owner_of, MeshInfo, PatcherContext, PatcherSet, ShaderFamily,
};
use crate::priority::{get_winning_match, resolve_mod_order, KeepPriorOrder, ModOrderResolver, ModPriority};
use crate::runner::{TaskOutcome, TaskRunner, TaskTracker};
use crate::textures::{SuffixTable, TextureIndex};
use crate::user_config::UserConfig;
use camino::{Utf8Path, Utf8PathBuf};
use sp_mesh::{MeshFile, Shape};
use sp_vfs::{DataDirectory, FileFilter, VirtualPath};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress information emitted during a run.
///
/// `current`/`total` count meshes during `ScanningMeshes` and `PatchingMeshes`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProgress {
    pub stage: PatchStage,
    pub current: usize,
    pub total: usize,
}

/// Stages of a run, emitted in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchStage {
    /// Merging configuration.
    Loading,
    /// Parsing meshes to observe texture slot usage.
    ScanningMeshes,
    /// Deciding texture types.
    ClassifyingTextures,
    /// Gathering competing mods and deciding their order.
    ResolvingModOrder,
    /// Applying patches and writing meshes.
    PatchingMeshes,
    Complete,
}

/// Switches for a run.
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Process meshes on a worker pool.
    pub parallel: bool,
    /// Families switched off regardless of configuration.
    pub disabled: BTreeSet<ShaderFamily>,
    /// User configuration file, merged last and updated with the mod order.
    pub user_config: Option<Utf8PathBuf>,
}

/// Summary returned after a run.
#[derive(Debug)]
pub struct PatchReport {
    pub meshes_total: usize,
    pub meshes_patched: usize,
    pub outcomes: BTreeMap<TaskOutcome, usize>,
    /// Mod order used for this run, lowest priority first.
    pub mod_order: Vec<String>,
    pub elapsed: Duration,
}

type ProgressCallback = Arc<dyn Fn(PatchProgress) + Send + Sync>;

/// Orchestrates a patching run.
///
/// Create with [`new`](Self::new), configure with the `with_*` methods, then call
/// [`run`](Self::run).
pub struct PatchPipeline {
    directory: DataDirectory,
    output_dir: Utf8PathBuf,
    options: PatchOptions,
    images: Box<dyn ImageService>,
    resolver: Box<dyn ModOrderResolver>,
    progress_callback: Option<ProgressCallback>,
}

impl PatchPipeline {
    /// # Arguments
    ///
    /// * `directory` - A populated overlay of the game's data directory
    /// * `output_dir` - Where patched meshes and generated textures are written
    pub fn new(directory: DataDirectory, output_dir: Utf8PathBuf) -> Self {
        let directory = directory.with_generated_dir(output_dir.clone());
        Self {
            directory,
            output_dir,
            options: PatchOptions::default(),
            images: Box::new(DdsImageService::new()),
            resolver: Box::new(KeepPriorOrder),
            progress_callback: None,
        }
    }

    pub fn with_options(mut self, options: PatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_image_service(mut self, images: Box<dyn ImageService>) -> Self {
        self.images = images;
        self
    }

    pub fn with_mod_order_resolver(mut self, resolver: Box<dyn ModOrderResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Register a progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PatchProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Run the pipeline. See the module-level docs for the full algorithm.
    ///
    /// # Arguments
    ///
    /// * `diff` - Receives a checksum entry for every mesh written
    pub fn run(self, diff: &DiffRecord) -> Result<PatchReport> {
        let start_time = std::time::Instant::now();
        let runner = TaskRunner::new(self.options.parallel);

        self.emit_progress(PatchStage::Loading, 0, 0);
        tracing::info!("Data dir: {}", self.directory.data_dir());
        tracing::info!("Output dir: {}", self.output_dir);
        check_output_dir(&self.output_dir, self.directory.data_dir())?;
        let config = self.load_config()?;

        let meshes = self.discover_meshes(&config)?;
        let textures = self.classify_textures(&config, &meshes, &runner)?;

        let pbr_entries = load_pbr_entries(&self.directory)?;
        let ctx = PatcherContext::new(
            &self.directory,
            &textures,
            self.images.as_ref(),
            &config,
            pbr_entries,
        )?;
        let patchers = PatcherSet::from_config(&config, &self.options.disabled);

        self.emit_progress(PatchStage::ResolvingModOrder, 0, meshes.len());
        let mod_order = self.resolve_mod_order(&ctx, &patchers, &meshes, &runner)?;
        let priority = ModPriority::from_order(&mod_order);

        let total = meshes.len();
        let tracker = self.tracker("Mesh Patching", PatchStage::PatchingMeshes, total);
        self.emit_progress(PatchStage::PatchingMeshes, 0, total);
        let patcher = MeshPatcher {
            ctx: &ctx,
            patchers: &patchers,
            priority: &priority,
            output_dir: &self.output_dir,
            diff,
            transform_errors: Mutex::new(HashSet::new()),
        };
        runner.run(meshes, &tracker, |path| patcher.process_mesh(&path))?;

        self.emit_progress(PatchStage::Complete, total, total);
        let report = PatchReport {
            meshes_total: total,
            meshes_patched: diff.len(),
            outcomes: tracker.counts(),
            mod_order,
            elapsed: start_time.elapsed(),
        };
        tracing::info!(
            "Patched {} of {} meshes in {:.2?}",
            report.meshes_patched,
            report.meshes_total,
            report.elapsed
        );
        Ok(report)
    }

    fn load_config(&self) -> Result<PatcherConfig> {
        let mut loader = ConfigLoader::new()?;
        loader.merge_overlay(&self.directory)?;
        if let Some(user) = &self.options.user_config {
            loader.merge_user_file(user)?;
        }
        loader.finish()
    }

    fn discover_meshes(&self, config: &PatcherConfig) -> Result<Vec<VirtualPath>> {
        let filter = config.mesh_discovery.to_filter()?;
        let blocklist = FileFilter::denying(&config.nif_blocklist)?;
        let found = self.directory.find_files(&filter);
        let found_count = found.len();
        let meshes: Vec<VirtualPath> = found
            .into_iter()
            .filter(|path| {
                let blocked = blocklist.denies_path(path);
                if blocked {
                    tracing::trace!("Mesh blocklisted: {}", path);
                }
                !blocked
            })
            .collect();
        tracing::info!(
            "Found {} meshes ({} blocklisted)",
            meshes.len(),
            found_count - meshes.len()
        );
        Ok(meshes)
    }

    fn classify_textures(
        &self,
        config: &PatcherConfig,
        meshes: &[VirtualPath],
        runner: &TaskRunner,
    ) -> Result<TextureIndex> {
        let mut textures = TextureIndex::new(
            SuffixTable::new(&config.suffix_table()),
            config.manual_texture_maps(),
        );
        let filter = config.texture_discovery.to_filter()?;
        textures.scan(self.directory.find_files(&filter));
        let vanilla: Vec<VirtualPath> = textures
            .scanned()
            .filter(|path| {
                self.directory
                    .archive_of(path)
                    .is_some_and(|archive| config.is_vanilla_archive(archive))
            })
            .cloned()
            .collect();
        textures.set_vanilla_textures(vanilla);

        let tracker = self.tracker("Mesh Scanning", PatchStage::ScanningMeshes, meshes.len());
        self.emit_progress(PatchStage::ScanningMeshes, 0, meshes.len());
        let directory = &self.directory;
        let index = &textures;
        runner.run(meshes.to_vec(), &tracker, |path| {
            match load_mesh(directory, &path) {
                Ok(mesh) => {
                    index.observe_mesh(&mesh)?;
                    Ok(TaskOutcome::Success)
                }
                Err(e) => {
                    tracing::warn!("Unable to scan mesh {}: {}", path, e);
                    Ok(TaskOutcome::Failure)
                }
            }
        })?;

        self.emit_progress(PatchStage::ClassifyingTextures, 0, 0);
        let images = self.images.as_ref();
        textures.finalize(|path| {
            directory
                .get_file(path)
                .ok()
                .and_then(|bytes| images.decode(&bytes).ok())
                .map(|info| info.has_alpha)
                .unwrap_or(false)
        })?;
        Ok(textures)
    }

    fn resolve_mod_order(
        &self,
        ctx: &PatcherContext<'_>,
        patchers: &PatcherSet,
        meshes: &[VirtualPath],
        runner: &TaskRunner,
    ) -> Result<Vec<String>> {
        let conflicting: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());
        let tracker = TaskTracker::new("Mod Conflict Scan", meshes.len(), 10);
        runner.run(meshes.to_vec(), &tracker, |path| {
            let mesh = match load_mesh(ctx.directory, &path) {
                Ok(mesh) => mesh,
                Err(e) => {
                    tracing::debug!("Skipping mesh in conflict scan {}: {}", path, e);
                    return Ok(TaskOutcome::Failure);
                }
            };
            if mesh.shapes.iter().any(Shape::has_non_ascii_slot) {
                tracing::debug!("Skipping mesh in conflict scan {}: non-ASCII texture paths", path);
                return Ok(TaskOutcome::Failure);
            }
            let info = MeshInfo {
                path: &path,
                has_havok: mesh.has_havok,
            };
            let mut found = BTreeSet::new();
            for shape in mesh.shapes.iter().filter(|s| s.is_patchable()) {
                let owners: BTreeSet<String> = patchers
                    .collect_matches(ctx, &info, shape)
                    .into_iter()
                    .filter_map(|m| m.owner)
                    .collect();
                if owners.len() > 1 {
                    found.extend(owners);
                }
            }
            if !found.is_empty() {
                let mut conflicting = conflicting
                    .lock()
                    .map_err(|_| Error::Other("conflict set poisoned".to_string()))?;
                conflicting.extend(found);
            }
            Ok(TaskOutcome::Success)
        })?;

        let conflicting = conflicting
            .into_inner()
            .map_err(|_| Error::Other("conflict set poisoned".to_string()))?;
        tracing::info!("{} mods compete for shapes", conflicting.len());

        let prior = &ctx.config.mod_order;
        let (order, changed) = resolve_mod_order(self.resolver.as_ref(), &conflicting, prior);
        if changed {
            if let Some(path) = &self.options.user_config {
                UserConfig::store_mod_order(path, order.clone())?;
            }
        }
        Ok(order)
    }

    fn tracker(&self, name: &str, stage: PatchStage, total: usize) -> TaskTracker {
        let tracker = TaskTracker::new(name, total, 10);
        match self.progress_callback.clone() {
            Some(callback) => tracker.with_callback(move |current, total| {
                callback(PatchProgress {
                    stage,
                    current,
                    total,
                })
            }),
            None => tracker,
        }
    }

    fn emit_progress(&self, stage: PatchStage, current: usize, total: usize) {
        if let Some(callback) = &self.progress_callback {
            callback(PatchProgress {
                stage,
                current,
                total,
            });
        }
    }
}

fn load_mesh(directory: &DataDirectory, path: &VirtualPath) -> Result<MeshFile> {
    let bytes = directory.get_file(path)?;
    Ok(MeshFile::load(&bytes)?)
}

/// Per-run state shared by mesh tasks.
struct MeshPatcher<'a> {
    ctx: &'a PatcherContext<'a>,
    patchers: &'a PatcherSet,
    priority: &'a ModPriority,
    output_dir: &'a Utf8Path,
    diff: &'a DiffRecord,
    /// Textures whose transform already failed and was logged.
    transform_errors: Mutex<HashSet<VirtualPath>>,
}

impl MeshPatcher<'_> {
    fn process_mesh(&self, path: &VirtualPath) -> Result<TaskOutcome> {
        let span = tracing::debug_span!("mesh", path = %path);
        let _enter = span.enter();

        let output = self.output_dir.join(path.as_str());
        if output.exists() {
            return Err(Error::OutputExists(output));
        }

        let bytes = match self.ctx.directory.get_file(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Unable to read mesh {}: {}", path, e);
                return Ok(TaskOutcome::Failure);
            }
        };
        let mut mesh = match MeshFile::load(&bytes) {
            Ok(mesh) => mesh,
            Err(e) => {
                tracing::error!("Unable to parse mesh {}: {}", path, e);
                return Ok(TaskOutcome::Failure);
            }
        };
        if mesh.shapes.iter().any(Shape::has_non_ascii_slot) {
            tracing::error!("Mesh {} has non-ASCII texture paths, skipping", path);
            return Ok(TaskOutcome::Failure);
        }

        let mesh_priority = self.priority.of(owner_of(self.ctx, path).as_deref());
        let info = MeshInfo {
            path,
            has_havok: mesh.has_havok,
        };

        let mut outcome = TaskOutcome::Success;
        let mut modified = false;
        for (index, shape) in mesh.shapes.iter_mut().enumerate() {
            if !shape.is_patchable() {
                continue;
            }
            let span = tracing::trace_span!("shape", index);
            let _enter = span.enter();
            match self.process_shape(&info, shape, mesh_priority) {
                Ok(changed) => modified |= changed,
                Err(e) => {
                    tracing::warn!("Unable to patch shape {} of {}: {}", index, path, e);
                    outcome.escalate(TaskOutcome::SuccessWithWarnings, TaskOutcome::Failure);
                }
            }
        }

        if modified {
            let patched = mesh.dump()?;
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, &patched)?;
            self.diff.record(&path.to_game_string(), &bytes, &patched);
            tracing::debug!("Saved patched mesh: {}", output);
        }
        Ok(outcome)
    }

    /// Returns whether the shape changed.
    fn process_shape(
        &self,
        info: &MeshInfo<'_>,
        shape: &mut Shape,
        mesh_priority: Option<usize>,
    ) -> Result<bool> {
        let matches = self.patchers.collect_matches(self.ctx, info, shape);
        let Some(winner) = get_winning_match(&matches, mesh_priority, self.priority) else {
            tracing::trace!("No winning match");
            return Ok(false);
        };

        let mut family = winner.family;
        let mut matched = winner.matched.clone();
        if let Some(target) = winner.transform {
            let transform = self
                .patchers
                .transform_from(family)
                .ok_or_else(|| Error::Other(format!("no transform registered for {}", family)))?;
            match transform.transform(self.ctx, &matched) {
                Ok(transformed) => {
                    matched = transformed;
                    family = target;
                }
                Err(e) => {
                    self.log_transform_error(&matched.matched_path, &e);
                    let source_applies = self
                        .patchers
                        .patcher(family)
                        .map(|p| p.can_apply(self.ctx, info, shape))
                        .unwrap_or(false);
                    if !source_applies {
                        return Ok(false);
                    }
                }
            }
        }

        let patcher = self
            .patchers
            .patcher(family)
            .ok_or_else(|| Error::Other(format!("{} is not enabled", family)))?;
        tracing::trace!("Applying {} with {}", family, matched.matched_path);
        let mut changed = shape.normalize_texture_set()?;
        changed |= patcher.apply_patch(self.ctx, info, shape, &matched)?;
        Ok(changed)
    }

    fn log_transform_error(&self, texture: &VirtualPath, error: &Error) {
        let first = self
            .transform_errors
            .lock()
            .map(|mut seen| seen.insert(texture.clone()))
            .unwrap_or(true);
        if first {
            tracing::warn!("Unable to transform {}: {}", texture, error);
        }
    }
}
