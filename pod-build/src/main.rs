use anyhow::{anyhow, Result};
use crossterm::{
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    collections::BTreeMap as Map,
    env,
    ffi::OsString,
    io::{stdout, Write},
    path::{Path, PathBuf},
};
use structopt::StructOpt;

use backends::EngineCli;
use controller::Controller;
use frontends::DockerComposeFrontend;
use models::BuildOptions;
use services::ComposerFrontend;

mod backends;
mod build_args;
mod controller;
mod error;
mod frontends;
mod hasher;
mod models;
mod services;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "pod-build",
    about = "Builds, pulls and tags the images of a docker-compose application."
)]
enum Opt {
    /// Builds local images and pulls external ones, in dependency order.
    Build {
        #[structopt(long)]
        /// Build without the layer cache and pull every image.
        no_cache: bool,

        #[structopt(short, long)]
        /// Only this service and the services it depends on.
        service: Option<String>,

        #[structopt(long = "build-arg", number_of_values = 1, parse(try_from_str = parse_key_value))]
        /// Value for a build argument, KEY=VALUE. Overrides the environment.
        build_args: Vec<(String, String)>,

        #[structopt(long, env = "POD_BUILD_ENGINE", default_value = "docker")]
        /// Container engine to run, docker or podman.
        engine: String,

        #[structopt(long)]
        /// Namespace for image tags, defaults to the project directory name.
        app: Option<String>,

        #[structopt(short, long, parse(from_os_str))]
        /// Compose file to use instead of searching for one.
        file: Option<PathBuf>,
    },
}

fn parse_key_value(value: &str) -> Result<(String, String)> {
    let mut parts = value.splitn(2, '=');
    match (parts.next(), parts.next()) {
        (Some(key), Some(value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(anyhow!("expected KEY=VALUE, got {:?}", value)),
    }
}

/// Process variables overlaid with `--build-arg` pairs. Variables that are
/// not valid unicode can't be passed as build arguments and are left out.
fn build_environment<I>(vars: I, build_args: Vec<(String, String)>) -> Map<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut environment: Map<String, String> = vars
        .into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect();
    environment.extend(build_args);
    environment
}

fn find_compose_file<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    for path in path.as_ref().ancestors() {
        let docker_file_path = path.join("docker-compose.yml");
        if docker_file_path.exists() {
            return Some(docker_file_path);
        }

        let docker_file_path = path.join("docker-compose.yaml");
        if docker_file_path.exists() {
            return Some(docker_file_path);
        }
    }

    None
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    match opt {
        Opt::Build {
            no_cache,
            service,
            build_args,
            engine,
            app,
            file,
        } => {
            let compose_file_path = match file {
                Some(file) => file,
                None => find_compose_file(env::current_dir()?)
                    .ok_or_else(|| anyhow!("Couldn't find a docker-compose.yml file in the current working directory or any of its parents."))?,
            };
            info!("found compose file {:?}", compose_file_path);

            let work_directory = compose_file_path
                .parent()
                .ok_or_else(|| anyhow!("Docker compose file has no parent."))?
                .to_owned();
            let work_directory = if work_directory.as_os_str().is_empty() {
                env::current_dir()?
            } else {
                work_directory
            };
            info!("found work directory {:?}", work_directory);

            let project_name = match app {
                Some(app) => app,
                None => work_directory
                    .file_name()
                    .and_then(|path| path.to_str())
                    .ok_or_else(|| anyhow!("Couldn't determine the project name."))?
                    .to_owned(),
            };
            info!("project name {:?}", project_name);

            let mut frontend = DockerComposeFrontend::new();
            let manifest = frontend.manifest(&compose_file_path)?;
            info!("parsed {} services", manifest.services.len());

            let environment = build_environment(env::vars_os(), build_args);

            let options = BuildOptions {
                cache: !no_cache,
                environment,
                service,
            };

            let mut stdout = stdout();
            stdout
                .queue(style::PrintStyledContent("INFO: ".cyan().bold()))?
                .queue(style::Print(format!(
                    "building {} with {}\n",
                    project_name, engine
                )))?
                .flush()?;

            let mut runner = EngineCli::new(engine);
            Controller::new(&mut runner, &manifest, project_name.as_str()).build(
                &work_directory,
                &mut stdout,
                &options,
            )?;

            stdout
                .queue(style::PrintStyledContent("done".green().bold()))?
                .queue(style::Print("\n"))?
                .flush()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn build_args_need_a_key() {
        assert_eq!(
            parse_key_value("A=b=c").unwrap(),
            ("A".to_owned(), "b=c".to_owned())
        );
        assert_eq!(parse_key_value("A=").unwrap(), ("A".to_owned(), String::new()));
        assert!(parse_key_value("A").is_err());
        assert!(parse_key_value("=b").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn environment_skips_non_unicode_variables() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("VERSION"), OsString::from("1.0")),
            (OsString::from("BROKEN"), OsString::from_vec(vec![0xff])),
            (OsString::from("CHANNEL"), OsString::from("beta")),
        ];
        let build_args = vec![("VERSION".to_owned(), "2.0".to_owned())];

        let environment = build_environment(vars, build_args);

        assert_eq!(environment.len(), 2);
        assert_eq!(environment["VERSION"], "2.0");
        assert_eq!(environment["CHANNEL"], "beta");
        assert!(!environment.contains_key("BROKEN"));
    }

    #[test]
    fn compose_file_is_found_in_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("docker-compose.yaml"), "services: {}\n").unwrap();

        assert_eq!(
            find_compose_file(&nested),
            Some(dir.path().join("docker-compose.yaml"))
        );
    }
}
