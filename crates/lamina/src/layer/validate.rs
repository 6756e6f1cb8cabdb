//! Parent layer chain validation.

use std::io::ErrorKind;
use std::path::Path;

use lamina_common::{
    CONTENT_DIR, DiskRole, LayerError, LayerResult, MissingReason, UTILITY_VM_DIR, absolutize,
};

use super::{Layer, LayerIdentity, LayerStack};

/// How strictly the base-most layer's template disks are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateCheck {
    /// Do not look for template disks.
    Ignore,
    /// Log a warning for each missing template disk.
    #[default]
    Warn,
    /// Fail validation with [`LayerError::TemplateMissing`].
    Enforce,
}

/// Validates candidate layer paths into a [`LayerStack`].
#[derive(Debug, Clone)]
pub struct LayerStackValidator {
    identity: LayerIdentity,
    template_check: TemplateCheck,
}

impl LayerStackValidator {
    /// Create a validator.
    pub fn new(identity: LayerIdentity, template_check: TemplateCheck) -> Self {
        Self {
            identity,
            template_check,
        }
    }

    /// Validate read-only parent layers, most specific first.
    ///
    /// The returned stack preserves the input order, so the last path is the
    /// base-most layer.
    ///
    /// # Errors
    ///
    /// - [`LayerError::InvalidArgument`] if `require_at_least_one` is set and
    ///   `paths` is empty, a path is malformed, or a path appears twice.
    /// - [`LayerError::MissingContent`] if a path has no `Files` directory,
    ///   including when the path itself does not exist.
    /// - [`LayerError::StatFailed`] if a path cannot be inspected.
    /// - [`LayerError::LookupFailed`] if identity derivation fails.
    /// - [`LayerError::TemplateMissing`] if templates are enforced and the
    ///   base-most layer lacks one.
    pub async fn validate<P>(
        &self,
        paths: &[P],
        require_at_least_one: bool,
    ) -> LayerResult<LayerStack>
    where
        P: AsRef<Path> + Sync,
    {
        if require_at_least_one && paths.is_empty() {
            return Err(LayerError::invalid(
                "at least one read-only layer must be specified",
            ));
        }

        let mut layers: Vec<Layer> = Vec::with_capacity(paths.len());
        for candidate in paths {
            let path = absolutize(candidate)?;

            check_content(&path).await?;

            if layers.iter().any(|layer| layer.path() == path) {
                return Err(LayerError::invalid(format!(
                    "{} is listed more than once",
                    path.display()
                )));
            }

            let id = self.identity.identity(&path).await?;
            tracing::debug!(path = %path.display(), id = %id.short(), "Parent layer validated");
            layers.push(Layer::read_only(path, id));
        }

        if let Some(base) = layers.last() {
            self.check_base_templates(base.path()).await?;
        }

        Ok(LayerStack::new(layers))
    }

    /// Put the scratch layer at `scratch` on top of validated `parents`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotFound`] if `scratch` is not an existing
    /// directory, [`LayerError::InvalidArgument`] if it is malformed or is one
    /// of the parents, and [`LayerError::LookupFailed`] if identity derivation
    /// fails.
    pub async fn validate_scratch(
        &self,
        scratch: impl AsRef<Path>,
        parents: LayerStack,
    ) -> LayerResult<LayerStack> {
        let path = absolutize(scratch)?;

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(LayerError::NotFound { path }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LayerError::NotFound { path });
            }
            Err(source) => return Err(LayerError::StatFailed { path, source }),
        }

        let id = self.identity.identity(&path).await?;
        parents.with_scratch(Layer::scratch(path, id))
    }

    /// Validate `parents` (at least one required) and put `scratch` on top.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::validate`] or [`Self::validate_scratch`].
    pub async fn validate_for_mount<P>(
        &self,
        scratch: impl AsRef<Path>,
        parents: &[P],
    ) -> LayerResult<LayerStack>
    where
        P: AsRef<Path> + Sync,
    {
        let stack = self.validate(parents, true).await?;
        self.validate_scratch(scratch, stack).await
    }

    async fn check_base_templates(&self, base: &Path) -> LayerResult<()> {
        if self.template_check == TemplateCheck::Ignore {
            return Ok(());
        }

        let mut roles = vec![DiskRole::Base];
        if is_dir(&base.join(UTILITY_VM_DIR)).await {
            roles.push(DiskRole::UvmBase);
        }

        for role in roles {
            for disk in role.disk_paths(base) {
                let present = tokio::fs::try_exists(&disk).await.map_err(|source| {
                    LayerError::StatFailed {
                        path: disk.clone(),
                        source,
                    }
                })?;
                if present {
                    continue;
                }
                if self.template_check == TemplateCheck::Enforce {
                    return Err(LayerError::TemplateMissing { path: disk });
                }
                tracing::warn!(
                    base = %base.display(),
                    %role,
                    disk = %disk.display(),
                    "Base layer is missing a template virtual disk"
                );
            }
        }

        Ok(())
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

/// Check that `layer` has a `Files` content directory.
///
/// A missing or non-directory layer is reported as missing content too, with
/// the reason recording what was actually found.
pub(crate) async fn check_content(layer: &Path) -> LayerResult<()> {
    let content = layer.join(CONTENT_DIR);
    let missing = |reason| LayerError::MissingContent {
        layer: layer.to_path_buf(),
        content: content.clone(),
        reason,
    };

    match tokio::fs::metadata(&content).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(missing(MissingReason::ContentNotDirectory)),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            match tokio::fs::metadata(layer).await {
                Ok(metadata) if metadata.is_dir() => Err(missing(MissingReason::ContentAbsent)),
                Ok(_) => Err(missing(MissingReason::LayerNotDirectory)),
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                    Err(missing(MissingReason::LayerAbsent))
                }
                Err(source) => Err(LayerError::StatFailed {
                    path: layer.to_path_buf(),
                    source,
                }),
            }
        }
        Err(source) => Err(LayerError::StatFailed {
            path: content.clone(),
            source,
        }),
    }
}
