use serde::{Deserialize, Serialize};

/// Identity of a caller or of a resource owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub backend_roles: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_backend_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backend_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Parses the `name|backend_role,..|role,..` user string carried in the
    /// `x-ml-user` header. Trailing sections may be omitted.
    pub fn parse(raw: &str) -> Option<User> {
        let mut parts = raw.split('|');
        let name = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }

        let split = |section: Option<&str>| -> Vec<String> {
            section
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        Some(User {
            name: name.to_string(),
            backend_roles: split(parts.next()),
            roles: split(parts.next()),
        })
    }

    /// Inverse of [`User::parse`].
    pub fn to_header_value(&self) -> String {
        format!(
            "{}|{}|{}",
            self.name,
            self.backend_roles.join(","),
            self.roles.join(",")
        )
    }
}
