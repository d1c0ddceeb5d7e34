use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{self, Mapping, Value};
use std::{
    collections::BTreeMap as Map,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    models::{BuildSpec, Manifest, Service},
    services::ComposerFrontend,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DockerComposeFile {
    // Kept as a mapping so services stay in declaration order.
    pub services: Mapping,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ComposeService {
    pub image: Option<String>,

    pub build: Option<Build>,

    pub dockerfile: Option<String>,

    #[serde(default)]
    pub depends_on: DependsOn,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Build {
    Short(String),
    Extended {
        context: Option<String>,

        dockerfile: Option<String>,

        #[serde(default)]
        args: MapList,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum DependsOn {
    List(Vec<String>),
    Conditions(Mapping),
}

impl Default for DependsOn {
    fn default() -> Self {
        DependsOn::List(Vec::new())
    }
}

impl DependsOn {
    fn into_names(self) -> Result<Vec<String>> {
        match self {
            DependsOn::List(names) => Ok(names),
            DependsOn::Conditions(conditions) => conditions
                .into_iter()
                .map(|(name, _)| match name {
                    Value::String(name) => Ok(name),
                    name => Err(anyhow!("dependency names must be strings, found {:?}", name)),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum MapList {
    Map(Map<String, String>),
    List(Vec<String>),
}

impl Default for MapList {
    fn default() -> Self {
        MapList::List(Vec::new())
    }
}

impl MapList {
    pub fn to_map(self) -> Map<String, String> {
        match self {
            MapList::Map(map) => map,
            MapList::List(list) => list.into_iter().map(MapList::split_value).collect(),
        }
    }

    fn split_value(value: String) -> (String, String) {
        let mut parts = value.splitn(2, '=');
        let key = parts.next().unwrap_or_default().to_owned();
        let value = parts.next().unwrap_or_default().to_owned();
        (key, value)
    }
}

impl From<Build> for BuildSpec {
    fn from(build: Build) -> BuildSpec {
        match build {
            Build::Short(context) => BuildSpec {
                context: Some(PathBuf::from(context)),
                ..Default::default()
            },
            Build::Extended {
                context,
                dockerfile,
                args,
            } => BuildSpec {
                context: context.map(PathBuf::from),
                dockerfile: dockerfile.map(PathBuf::from),
                args: args.to_map(),
            },
        }
    }
}

pub struct DockerComposeFrontend;

impl DockerComposeFrontend {
    pub fn new() -> DockerComposeFrontend {
        DockerComposeFrontend
    }

    pub fn parse(contents: &str) -> Result<Manifest> {
        let file: DockerComposeFile = serde_yaml::from_str(contents)?;
        DockerComposeFrontend::convert(file)
    }

    fn convert(file: DockerComposeFile) -> Result<Manifest> {
        let mut manifest = Manifest::default();

        for (name, service) in file.services {
            let name = name
                .as_str()
                .ok_or_else(|| anyhow!("service names must be strings, found {:?}", name))?
                .to_owned();

            // `web:` with nothing under it is a service with no settings.
            let service: ComposeService = match service {
                Value::Null => Default::default(),
                service => serde_yaml::from_value(service)
                    .with_context(|| format!("invalid service {:?}", name))?,
            };

            let depends_on = service
                .depends_on
                .into_names()
                .with_context(|| format!("invalid service {:?}", name))?;

            manifest.services.push(Service {
                name,
                image: service.image,
                build: service.build.map(BuildSpec::from).unwrap_or_default(),
                dockerfile: service.dockerfile.map(PathBuf::from),
                depends_on,
            });
        }

        Ok(manifest)
    }
}

impl ComposerFrontend for DockerComposeFrontend {
    fn manifest(&mut self, compose_file_path: &Path) -> Result<Manifest> {
        let contents = fs::read_to_string(compose_file_path)
            .with_context(|| format!("couldn't read {:?}", compose_file_path))?;

        DockerComposeFrontend::parse(&contents)
            .with_context(|| format!("couldn't parse {:?}", compose_file_path))
    }
}
