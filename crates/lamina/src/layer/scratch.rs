//! Writable scratch layer creation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lamina_common::{DiskLayout, LayerError, LayerResult, absolutize};
use serde::Serialize;

use super::{Layer, LayerIdentity, LayerStack};
use crate::rollback::Rollback;

/// A freshly created writable layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScratchLayer {
    layer: Layer,
    sandbox: PathBuf,
    template: PathBuf,
}

impl ScratchLayer {
    /// The new layer.
    #[must_use]
    pub const fn layer(&self) -> &Layer {
        &self.layer
    }

    /// The working virtual disk inside the layer.
    #[must_use]
    pub fn sandbox(&self) -> &Path {
        &self.sandbox
    }

    /// The template the working disk was copied from.
    #[must_use]
    pub fn template(&self) -> &Path {
        &self.template
    }
}

/// Creates scratch layers from a base layer's template disk.
#[derive(Debug, Clone)]
pub struct ScratchLayerFactory {
    identity: LayerIdentity,
}

impl ScratchLayerFactory {
    /// Create a factory.
    pub fn new(identity: LayerIdentity) -> Self {
        Self { identity }
    }

    /// Create a writable layer at `new_layer_path` over `parents`.
    ///
    /// The base-most parent's `blank.vhdx` is copied byte for byte into
    /// `sandbox.vhdx`. If the copy fails, the new directory is removed again.
    ///
    /// # Errors
    ///
    /// - [`LayerError::AlreadyExists`] if anything exists at `new_layer_path`.
    /// - [`LayerError::StatFailed`] if that cannot be determined.
    /// - [`LayerError::InvalidArgument`] if `parents` has no read-only layer.
    /// - [`LayerError::TemplateMissing`] if the base has no template disk.
    /// - [`LayerError::CreateFailed`] / [`LayerError::CopyFailed`] on
    ///   filesystem failures.
    pub async fn create_scratch(
        &self,
        new_layer_path: impl AsRef<Path>,
        parents: &LayerStack,
    ) -> LayerResult<ScratchLayer> {
        let path = absolutize(new_layer_path)?;

        match tokio::fs::symlink_metadata(&path).await {
            Ok(_) => return Err(LayerError::AlreadyExists { path }),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(LayerError::StatFailed { path, source }),
        }

        if parents.scratch().is_some() {
            return Err(LayerError::invalid(
                "a scratch layer cannot be the parent of another scratch layer",
            ));
        }
        let base = parents.base().ok_or_else(|| {
            LayerError::invalid("at least one read-only layer must be specified")
        })?;

        let layout = DiskLayout::CONTAINER;
        let template = layout.template_path(base.path());
        match tokio::fs::metadata(&template).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(LayerError::TemplateMissing { path: template }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LayerError::TemplateMissing { path: template });
            }
            Err(source) => {
                return Err(LayerError::StatFailed {
                    path: template,
                    source,
                });
            }
        }

        let id = self.identity.identity(&path).await?;

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| LayerError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        let mut rollback = Rollback::new("create scratch layer");
        let created = path.clone();
        rollback.push("remove scratch directory", move || async move {
            tokio::fs::remove_dir_all(&created).await?;
            Ok(())
        });

        let sandbox = layout.sandbox_path(&path);
        if let Err(source) = tokio::fs::copy(&template, &sandbox).await {
            let error = LayerError::CopyFailed {
                from: template,
                to: sandbox,
                source,
            };
            rollback.unwind(&error).await;
            return Err(error);
        }
        rollback.disarm();

        tracing::info!(
            path = %path.display(),
            id = %id.short(),
            template = %template.display(),
            "Scratch layer created"
        );

        Ok(ScratchLayer {
            layer: Layer::scratch(path, id),
            sandbox,
            template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lamina_common::CONTENT_DIR;

    use crate::layer::{LayerStackValidator, TemplateCheck};
    use crate::services::PathNamer;

    fn identity() -> LayerIdentity {
        LayerIdentity::new(Arc::new(PathNamer))
    }

    async fn base_stack(root: &Path) -> LayerStack {
        let base = root.join("base");
        std::fs::create_dir_all(base.join(CONTENT_DIR)).unwrap();
        std::fs::write(base.join("blank-base.vhdx"), b"vhdxfile-base").unwrap();
        std::fs::write(base.join("blank.vhdx"), b"vhdxfile-template-bytes").unwrap();

        LayerStackValidator::new(identity(), TemplateCheck::Enforce)
            .validate(&[&base], true)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn copies_template() {
        let dir = tempfile::tempdir().unwrap();
        let parents = base_stack(dir.path()).await;
        let target = dir.path().join("scratch");

        let scratch = ScratchLayerFactory::new(identity())
            .create_scratch(&target, &parents)
            .await
            .unwrap();

        assert!(scratch.layer().is_scratch());
        assert_eq!(scratch.sandbox(), target.join("sandbox.vhdx"));
        assert_eq!(
            std::fs::read(scratch.sandbox()).unwrap(),
            b"vhdxfile-template-bytes"
        );
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let parents = base_stack(dir.path()).await;
        let factory = ScratchLayerFactory::new(identity());

        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();
        let populated = dir.path().join("populated");
        std::fs::create_dir(&populated).unwrap();
        std::fs::write(populated.join("keep"), b"").unwrap();

        for target in [file, populated] {
            assert!(matches!(
                factory.create_scratch(&target, &parents).await,
                Err(LayerError::AlreadyExists { .. })
            ));
        }
        assert!(dir.path().join("populated/keep").exists());
    }

    #[tokio::test]
    async fn missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        std::fs::create_dir_all(base.join(CONTENT_DIR)).unwrap();
        let parents = LayerStackValidator::new(identity(), TemplateCheck::Ignore)
            .validate(&[&base], true)
            .await
            .unwrap();
        let target = dir.path().join("scratch");

        assert!(matches!(
            ScratchLayerFactory::new(identity())
                .create_scratch(&target, &parents)
                .await,
            Err(LayerError::TemplateMissing { .. })
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn requires_a_parent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ScratchLayerFactory::new(identity())
                .create_scratch(dir.path().join("scratch"), &LayerStack::empty())
                .await,
            Err(LayerError::InvalidArgument { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_template_link() {
        let dir = tempfile::tempdir().unwrap();
        let parents = base_stack(dir.path()).await;
        let template = dir.path().join("base/blank.vhdx");
        std::fs::remove_file(&template).unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &template).unwrap();
        let target = dir.path().join("scratch");

        assert!(matches!(
            ScratchLayerFactory::new(identity())
                .create_scratch(&target, &parents)
                .await,
            Err(LayerError::TemplateMissing { .. })
        ));
        assert!(!target.exists());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn copy_failure_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let parents = base_stack(dir.path()).await;
        let template = dir.path().join("base/blank.vhdx");
        std::fs::remove_file(&template).unwrap();
        // Reading from offset zero of our own address space fails with EIO.
        std::os::unix::fs::symlink("/proc/self/mem", &template).unwrap();
        let target = dir.path().join("scratch");

        assert!(matches!(
            ScratchLayerFactory::new(identity())
                .create_scratch(&target, &parents)
                .await,
            Err(LayerError::CopyFailed { .. })
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn rejects_scratch_parent() {
        let dir = tempfile::tempdir().unwrap();
        let parents = base_stack(dir.path())
            .await
            .with_scratch(Layer::scratch(
                dir.path().join("other"),
                lamina_common::LayerId::derive(&dir.path().join("other")),
            ))
            .unwrap();

        assert!(matches!(
            ScratchLayerFactory::new(identity())
                .create_scratch(dir.path().join("scratch"), &parents)
                .await,
            Err(LayerError::InvalidArgument { .. })
        ));
    }
}
