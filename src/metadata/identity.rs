//! Assembly identities.
//!
//! [`AssemblyName`] identifies a loaded assembly or the target of an `AssemblyRef`. The
//! resolver keys its external-assembly cache by [`AssemblyName::display_name`] and matches
//! references against loaded modules by [`AssemblyName::matches`].

use std::{fmt, fmt::Write, str::FromStr};

use crate::{Error, Result};

/// Four-part assembly version (`major.minor.build.revision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssemblyVersion {
    /// Major version component.
    pub major: u16,
    /// Minor version component.
    pub minor: u16,
    /// Build version component.
    pub build: u16,
    /// Revision version component.
    pub revision: u16,
}

impl AssemblyVersion {
    /// Creates a new version from its four components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parses a dotted version string. Missing trailing components default to zero.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the string has more than four components or a
    /// component is not a valid `u16`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = [0u16; 4];
        for (i, part) in s.trim().split('.').enumerate() {
            if i >= 4 {
                return Err(malformed_error!("Too many version components in '{}'", s));
            }
            parts[i] = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component '{}' in '{}'", part, s))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for AssemblyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Identity of an assembly, as found in the `Assembly` and `AssemblyRef` tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyName {
    /// Simple name, e.g. `mscorlib`
    pub name: String,
    /// Assembly version
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Public key token, `None` for unsigned assemblies
    pub public_key_token: Option<[u8; 8]>,
}

impl AssemblyName {
    /// Creates a culture-neutral, unsigned assembly name.
    #[must_use]
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        Self {
            name: name.into(),
            version,
            culture: None,
            public_key_token: None,
        }
    }

    /// Sets the public key token.
    #[must_use]
    pub fn with_public_key_token(mut self, token: [u8; 8]) -> Self {
        self.public_key_token = Some(token);
        self
    }

    /// Sets the culture.
    #[must_use]
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }

    /// Returns the full display name, e.g.
    /// `mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);

        result.push_str(&self.name);
        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        match self.public_key_token {
            Some(token) => {
                result.push_str(", PublicKeyToken=");
                for byte in token {
                    let _ = write!(result, "{byte:02x}");
                }
            }
            None => result.push_str(", PublicKeyToken=null"),
        }

        result
    }

    /// Returns true if `self` (usually a reference) is satisfied by `other` (usually a
    /// loaded assembly).
    ///
    /// Simple names compare case-insensitively; the culture and public key token must agree
    /// when the reference specifies them. Versions are not compared: a patching run loads
    /// one copy of each assembly and binding redirects are the driver's concern.
    #[must_use]
    pub fn matches(&self, other: &AssemblyName) -> bool {
        if !self.name.eq_ignore_ascii_case(&other.name) {
            return false;
        }

        let culture = |c: &Option<String>| {
            c.as_deref()
                .filter(|c| !c.eq_ignore_ascii_case("neutral"))
                .map(str::to_ascii_lowercase)
        };
        if culture(&self.culture) != culture(&other.culture) {
            return false;
        }

        match (self.public_key_token, other.public_key_token) {
            (Some(a), Some(b)) => a == b,
            (Some(_), None) => false,
            _ => true,
        }
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let version = AssemblyVersion::parse("4.0.30319.42").unwrap();
        assert_eq!(version, AssemblyVersion::new(4, 0, 30319, 42));

        let partial: AssemblyVersion = "2.1".parse().unwrap();
        assert_eq!(partial, AssemblyVersion::new(2, 1, 0, 0));

        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
    }

    #[test]
    fn test_display_name() {
        let name = AssemblyName::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
            .with_public_key_token([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]);
        assert_eq!(
            name.display_name(),
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
        );

        let unsigned = AssemblyName::new("Crypto", AssemblyVersion::new(1, 0, 0, 0));
        assert_eq!(
            unsigned.to_string(),
            "Crypto, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );
    }

    #[test]
    fn test_matches() {
        let loaded = AssemblyName::new("Crypto", AssemblyVersion::new(1, 0, 0, 0))
            .with_public_key_token([1, 2, 3, 4, 5, 6, 7, 8]);

        let reference = AssemblyName::new("crypto", AssemblyVersion::new(2, 0, 0, 0));
        assert!(reference.matches(&loaded));

        let signed = reference.clone().with_public_key_token([8, 7, 6, 5, 4, 3, 2, 1]);
        assert!(!signed.matches(&loaded));

        let localized = reference.with_culture("de-DE");
        assert!(!localized.matches(&loaded));

        let other = AssemblyName::new("Other", AssemblyVersion::default());
        assert!(!other.matches(&loaded));
    }
}
