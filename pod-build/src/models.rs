use log::debug;
use std::{
    collections::BTreeMap as Map,
    fmt,
    path::PathBuf,
};

use crate::error::Error;

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageName(pub String);

impl ImageName {
    /// Makes the implicit `:latest` explicit, so `nginx` and `nginx:latest`
    /// are pulled once. Only the last path segment is checked, a registry
    /// port like `localhost:5000/app` is not a tag.
    pub fn normalize(reference: &str) -> ImageName {
        let last_segment = reference.rsplit('/').next().unwrap_or(reference);
        if last_segment.contains(':') {
            ImageName(reference.to_owned())
        } else {
            ImageName(format!("{}:latest", reference))
        }
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination reference for the image of one service.
#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct Tag(pub String);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct BuildSpec {
    pub context: Option<PathBuf>,
    pub dockerfile: Option<PathBuf>,
    pub args: Map<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub image: Option<String>,
    pub build: BuildSpec,
    pub dockerfile: Option<PathBuf>,
    pub depends_on: Vec<String>,
}

impl Service {
    pub fn tag(&self, app_name: &str) -> Tag {
        Tag(format!("{}/{}", app_name, self.name))
    }
}

#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// When false, builds run with `--no-cache` and every image is pulled.
    pub cache: bool,
    pub environment: Map<String, String>,
    pub service: Option<String>,
}

/// Services in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    pub services: Vec<Service>,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl Manifest {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Returns services so that every service comes after its dependencies.
    /// With a filter only that service and its transitive dependencies are
    /// returned.
    pub fn run_order(&self, filter: Option<&str>) -> Result<Vec<&Service>, Error> {
        let roots = match filter {
            Some(name) => vec![self.service(name).ok_or_else(|| Error::Resolution {
                service: name.to_owned(),
                reason: "no such service".into(),
            })?],
            None => self.services.iter().collect(),
        };

        let mut marks = Map::new();
        let mut order = Vec::with_capacity(self.services.len());

        for root in roots {
            self.visit(root, &mut marks, &mut order)?;
        }

        debug!(
            "run order: {:?}",
            order.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        service: &'a Service,
        marks: &mut Map<&'a str, Mark>,
        order: &mut Vec<&'a Service>,
    ) -> Result<(), Error> {
        match marks.get(service.name.as_str()) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(Error::Resolution {
                    service: service.name.clone(),
                    reason: "dependency cycle".into(),
                })
            }
            None => (),
        }

        marks.insert(service.name.as_str(), Mark::Visiting);

        for dependency in service.depends_on.iter() {
            let dependency = self.service(dependency).ok_or_else(|| Error::Resolution {
                service: service.name.clone(),
                reason: format!("unknown dependency {:?}", dependency),
            })?;
            self.visit(dependency, marks, order)?;
        }

        marks.insert(service.name.as_str(), Mark::Done);
        order.push(service);

        Ok(())
    }
}
