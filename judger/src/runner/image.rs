//! Preparing the sandbox image of each language.
//!
//! An image is either pulled (a configured prebuilt tag), built from a custom
//! Dockerfile, or built from the Dockerfile bundled with this crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::{image::CreateImageOptions, models::ErrorDetail, Docker};
use derive_builder::Builder;
use err_derive::Error;
use hyper::Body;
use tokio_stream::StreamExt;

use super::docker::is_recoverable_error;
use crate::{
    config::JudgerConfig,
    lang::{ImageSource, Language, LanguageConfig},
    util::tar::pack_dir,
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(display = "Failed to pull image: {}", _0)]
    ImagePullFailure(String),

    #[error(display = "Failed to build image: {}", error)]
    BuildError {
        error: String,
        detail: Option<ErrorDetail>,
    },

    #[error(display = "Error when transferring files: {}", _0)]
    FileTransferError(String),

    #[error(display = "Image build timed out")]
    Timeout,

    #[error(display = "{:#}", _0)]
    Internal(anyhow::Error),
}

/// The Dockerfile shipped with this crate for `language`.
pub fn bundled_dockerfile(language: Language) -> &'static str {
    match language {
        Language::Python => include_str!("../../dockerfiles/python.Dockerfile"),
        Language::JavaScript => include_str!("../../dockerfiles/javascript.Dockerfile"),
        Language::Java => include_str!("../../dockerfiles/java.Dockerfile"),
        Language::Cpp => include_str!("../../dockerfiles/cpp.Dockerfile"),
        Language::Go => include_str!("../../dockerfiles/go.Dockerfile"),
    }
}

#[derive(Builder, Debug)]
#[builder(setter(into), pattern = "owned")]
pub struct BuildImageOptions {
    /// The tag of the resulting image
    tag_as: String,

    #[builder(default)]
    cpu_quota: Option<f64>,

    /// Build timeout
    #[builder(default)]
    timeout: Option<Duration>,
}

/// Where the image of one language comes from, resolved against the
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePlan {
    Pull { tag: String },
    Build { context: PathBuf, dockerfile: String, tag: String },
}

impl ImagePlan {
    pub fn for_language(cfg: &JudgerConfig, lang: &LanguageConfig) -> ImagePlan {
        match &lang.image_source {
            Some(ImageSource::Prebuilt(tag)) => ImagePlan::Pull { tag: tag.clone() },
            Some(ImageSource::Dockerfile { tag, dockerfile }) => ImagePlan::Build {
                context: dockerfile
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")),
                dockerfile: dockerfile
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Dockerfile".into()),
                tag: tag.clone(),
            },
            None => ImagePlan::Build {
                context: cfg.image_folder(lang.language),
                dockerfile: "Dockerfile".into(),
                tag: lang.sandbox_image.clone(),
            },
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ImagePlan::Pull { tag } | ImagePlan::Build { tag, .. } => tag,
        }
    }
}

/// Make the sandbox image of `lang` available to `docker`.
#[tracing::instrument(skip(docker, cfg, lang), fields(language = %lang.language))]
pub async fn prepare_image(
    docker: &Docker,
    cfg: &JudgerConfig,
    lang: &LanguageConfig,
    timeout: Option<Duration>,
) -> Result<(), BuildError> {
    let plan = ImagePlan::for_language(cfg, lang);
    if lang.image_source.is_none() {
        write_bundled_context(cfg, lang.language)
            .await
            .map_err(|e| BuildError::FileTransferError(e.to_string()))?;
    }
    tracing::info!(tag = plan.tag(), "Preparing image");

    let opt = BuildImageOptionsBuilder::default()
        .tag_as(plan.tag())
        .cpu_quota(Some(cfg.docker.run_cpu_share))
        .timeout(timeout)
        .build()
        .map_err(|e| BuildError::Internal(anyhow::anyhow!("{}", e)))?;
    build_image(docker.clone(), &plan, opt).await
}

async fn write_bundled_context(cfg: &JudgerConfig, language: Language) -> std::io::Result<()> {
    let folder = cfg.image_folder(language);
    tokio::fs::create_dir_all(&folder).await?;
    tokio::fs::write(folder.join("Dockerfile"), bundled_dockerfile(language)).await
}

/// Build an image from the specified [`ImagePlan`].
pub async fn build_image(
    docker: Docker,
    plan: &ImagePlan,
    opt: BuildImageOptions,
) -> Result<(), BuildError> {
    let timeout = opt.timeout;

    let build_job = async {
        match plan {
            ImagePlan::Pull { tag } => build_prebuilt_image(docker, tag).await,
            ImagePlan::Build {
                context,
                dockerfile,
                ..
            } => build_image_from_dockerfile(docker, context, dockerfile, &opt).await,
        }
    };

    if let Some(timeout) = timeout {
        tokio::time::timeout(timeout, build_job)
            .await
            .map_err(|_| BuildError::Timeout)
            .and_then(|i| i)
    } else {
        build_job.await
    }
}

async fn build_prebuilt_image(docker: Docker, tag: &str) -> Result<(), BuildError> {
    let mut create_img = Box::pin(docker.create_image(
        Some(CreateImageOptions {
            from_image: tag,
            ..Default::default()
        }),
        None,
        None,
    ));
    while let Some(res) = create_img.next().await {
        let info = res.map_err(|e| BuildError::ImagePullFailure(e.to_string()))?;
        if let Some(status) = info.status {
            tracing::debug!(%tag, "{}", status);
        }
    }
    Ok(())
}

async fn build_image_from_dockerfile(
    docker: Docker,
    context: &Path,
    dockerfile: &str,
    opt: &BuildImageOptions,
) -> Result<(), BuildError> {
    let cpu_quota = opt.cpu_quota.map(|x| (x * 100_000f64).floor() as u64);
    let cpu_period = cpu_quota.map(|_| 100_000);

    let build_options = bollard::image::BuildImageOptions {
        dockerfile,
        t: opt.tag_as.as_str(),
        cpuquota: cpu_quota,
        cpuperiod: cpu_period,
        rm: true,
        ..Default::default()
    };

    let (tar, join_tar) = pack_dir(context.to_path_buf());

    let mut res = Box::pin(docker.build_image(build_options, None, Some(Body::wrap_stream(tar))));

    while let Some(info) = res.next().await {
        match info {
            Ok(info) => {
                if let Some(e) = info.error {
                    return Err(BuildError::BuildError {
                        error: e,
                        detail: info.error_detail,
                    });
                }
                if let Some(stream) = info.stream {
                    tracing::debug!(tag = %opt.tag_as, "{}", stream.trim_end());
                }
            }
            Err(e) => {
                if !is_recoverable_error(&e) {
                    return Err(BuildError::Internal(e.into()));
                }
                tracing::warn!("Internal error when building image: {:?}", e);
            }
        }
    }

    join_tar
        .await
        .map_err(|e| {
            BuildError::Internal(
                anyhow::Error::new(e).context("Internal panic when archiving files"),
            )
        })?
        .map_err(|e| BuildError::FileTransferError(format!("Failed to archive files: {}", e)))?;

    Ok(())
}
