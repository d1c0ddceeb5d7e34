use log::{debug, info};
use std::{
    collections::BTreeMap as Map,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    build_args::read_declared_args,
    error::Error,
    hasher::Signature,
    models::{BuildOptions, ImageName, Manifest, Service, Tag, DEFAULT_DOCKERFILE},
    services::CommandRunner,
};

/// External images and the tags that must point at them, in first-seen
/// order.
#[derive(Debug, Default)]
pub struct PullSet {
    order: Vec<ImageName>,
    tags: Map<ImageName, Vec<Tag>>,
}

impl PullSet {
    pub fn insert(&mut self, image: ImageName, tag: Tag) {
        if !self.tags.contains_key(&image) {
            self.order.push(image.clone());
        }
        self.tags.entry(image).or_default().push(tag);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageName, &[Tag])> {
        self.order
            .iter()
            .map(move |image| (image, self.tags[image].as_slice()))
    }
}

/// Resolved services split into what is built locally and what is pulled.
#[derive(Debug)]
pub struct BuildPlan<'a> {
    pub builds: Vec<&'a Service>,
    pub pulls: PullSet,
}

impl<'a> BuildPlan<'a> {
    pub fn classify(services: Vec<&'a Service>, app_name: &str) -> BuildPlan<'a> {
        let mut builds = Vec::new();
        let mut pulls = PullSet::default();

        for service in services {
            match &service.image {
                Some(image) => pulls.insert(ImageName::normalize(image), service.tag(app_name)),
                None => builds.push(service),
            }
        }

        BuildPlan { builds, pulls }
    }
}

/// Tags already produced during this run, keyed by build signature.
#[derive(Debug, Default)]
pub struct BuildCache {
    built: Map<Signature, Tag>,
}

impl BuildCache {
    pub fn get(&self, signature: &Signature) -> Option<&Tag> {
        self.built.get(signature)
    }

    pub fn insert(&mut self, signature: Signature, tag: Tag) {
        self.built.insert(signature, tag);
    }
}

pub struct Controller<'a> {
    runner: &'a mut dyn CommandRunner,
    manifest: &'a Manifest,
    app_name: String,
}

impl<'a> Controller<'a> {
    pub fn new<P>(runner: &'a mut dyn CommandRunner, manifest: &'a Manifest, app_name: P) -> Self
    where
        P: Into<String>,
    {
        Controller {
            runner,
            manifest,
            app_name: app_name.into(),
        }
    }

    /// Builds, pulls and tags the images of every selected service. The
    /// first failure stops the run.
    pub fn build(
        &mut self,
        work_directory: &Path,
        output: &mut dyn Write,
        options: &BuildOptions,
    ) -> Result<(), Error> {
        let manifest = self.manifest;
        let services = manifest.run_order(options.service.as_deref())?;
        let plan = BuildPlan::classify(services, &self.app_name);

        info!(
            "{} services to build, {} images to pull",
            plan.builds.len(),
            plan.pulls.order.len()
        );

        self.build_images(&plan.builds, work_directory, output, options)?;
        self.pull_images(&plan.pulls, output, options)?;

        Ok(())
    }

    pub fn build_images(
        &mut self,
        services: &[&Service],
        work_directory: &Path,
        output: &mut dyn Write,
        options: &BuildOptions,
    ) -> Result<(), Error> {
        let mut cache = BuildCache::default();

        for service in services {
            let tag = service.tag(&self.app_name);
            let signature = Signature::of(&(&service.build, dockerfile_override(service)));
            debug!("{} has build signature {}", tag, signature);

            if let Some(built) = cache.get(&signature) {
                info!("reusing {} for {}", built, tag);
                let args = vec!["tag".into(), built.0.clone(), tag.0.clone()];
                self.invoke(output, "tag", &tag.0, args)?;
                continue;
            }

            let context = build_context(work_directory, service);
            let dockerfile = dockerfile_path(&context, service);
            debug!("context {:?}, dockerfile {:?}", context, dockerfile);

            let mut args = vec!["build".to_owned()];

            if !options.cache {
                args.push("--no-cache".into());
            }

            // The environment wins over defaults given in the manifest.
            for name in read_declared_args(&dockerfile)? {
                let value = options
                    .environment
                    .get(&name)
                    .or_else(|| service.build.args.get(&name));

                if let Some(value) = value {
                    args.push("--build-arg".into());
                    args.push(format!("{}={}", name, quote(value)));
                }
            }

            args.push("-f".into());
            args.push(dockerfile.to_string_lossy().into_owned());
            args.push("-t".into());
            args.push(tag.0.clone());
            args.push(context.to_string_lossy().into_owned());

            info!("building {}", tag);
            self.invoke(output, "build", &tag.0, args)?;

            cache.insert(signature, tag);
        }

        Ok(())
    }

    pub fn pull_images(
        &mut self,
        pulls: &PullSet,
        output: &mut dyn Write,
        options: &BuildOptions,
    ) -> Result<(), Error> {
        for (image, tags) in pulls.iter() {
            let present = self.image_present(image)?;

            if !options.cache || !present {
                info!("pulling {}", image);
                self.invoke(output, "pull", &image.0, vec!["pull".into(), image.0.clone()])?;
            } else {
                debug!("{} is present locally", image);
            }

            for tag in tags {
                let args = vec!["tag".into(), image.0.clone(), tag.0.clone()];
                self.invoke(output, "tag", &tag.0, args)?;
            }
        }

        Ok(())
    }

    fn image_present(&mut self, image: &ImageName) -> Result<bool, Error> {
        let args = vec!["images".into(), "-q".into(), image.0.clone()];
        let stdout = self
            .runner
            .output(&args)
            .map_err(|source| Error::Inspection {
                image: image.0.clone(),
                source,
            })?;

        Ok(!String::from_utf8_lossy(&stdout).trim().is_empty())
    }

    fn invoke(
        &mut self,
        output: &mut dyn Write,
        operation: &'static str,
        target: &str,
        args: Vec<String>,
    ) -> Result<(), Error> {
        self.runner
            .run(output, &args)
            .map_err(|source| Error::Build {
                operation,
                target: target.to_owned(),
                source,
            })
    }
}

fn build_context(work_directory: &Path, service: &Service) -> PathBuf {
    match &service.build.context {
        Some(context) => work_directory.join(context),
        None => work_directory.join("."),
    }
}

/// The build spec's dockerfile wins over the service level one.
fn dockerfile_override(service: &Service) -> Option<&Path> {
    service
        .build
        .dockerfile
        .as_ref()
        .or_else(|| service.dockerfile.as_ref())
        .map(PathBuf::as_path)
}

/// Both overrides and the default are relative to the context.
fn dockerfile_path(context: &Path, service: &Service) -> PathBuf {
    let dockerfile = dockerfile_override(service).unwrap_or_else(|| Path::new(DEFAULT_DOCKERFILE));
    context.join(dockerfile)
}

/// Double quotes `value` with Go style escapes, which is what the engine's
/// build argument parser expects.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');

    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\u{7}' => quoted.push_str("\\a"),
            '\u{8}' => quoted.push_str("\\b"),
            '\u{c}' => quoted.push_str("\\f"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\u{b}' => quoted.push_str("\\v"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                quoted.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}
