use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;
mod utils;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated, opaque container identifier as handed out by the container runtime.
///
/// # Examples
///
/// ```
/// # use dockerx::container::{ContainerID, Error};
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.as_ref(), "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyContainerID`] for an empty input and
    /// [`Error::InvalidContainerID`] if the length of the input exceeds
    /// [`CONTAINER_ID_MAX_LEN`] or it contains a `/`, which would escape the
    /// request path of the runtime API.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dockerx::container::{ContainerID, Error};
    /// assert!(ContainerID::new("abcdef012345").is_ok());
    /// assert!(matches!(ContainerID::new(""), Err(Error::EmptyContainerID)));
    /// ```
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() {
            return Err(Error::EmptyContainerID);
        }
        if src.len() > CONTAINER_ID_MAX_LEN || src.contains('/') {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the abbreviated form of the id, as shown by `docker ps`.
    pub fn short(&self) -> &str {
        utils::short_id(&self.0)
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A container as seen by one collection cycle.
///
/// The `id` addresses the container at the runtime, the `display_name` labels
/// its metric series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerIdentity {
    id: ContainerID,
    display_name: String,
}

impl ContainerIdentity {
    pub fn new(id: ContainerID, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Builds an identity from the names list reported by the runtime.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dockerx::container::{ContainerID, ContainerIdentity};
    /// let id = ContainerID::new("0123456789abcdef").unwrap();
    /// let identity = ContainerIdentity::from_names(id.clone(), &["/web-1".to_owned()]);
    /// assert_eq!(identity.display_name(), "web-1");
    ///
    /// let unnamed = ContainerIdentity::from_names(id, &[]);
    /// assert_eq!(unnamed.display_name(), "0123456789ab");
    /// ```
    pub fn from_names(id: ContainerID, names: &[String]) -> Self {
        let display_name = utils::display_name(names, id.as_ref());
        Self { id, display_name }
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id.short())
    }
}
