//! Strongly typed identifiers for directory tenants and application registrations.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}

			/// Returns a log-safe prefix of the identifier (`abcd1234…`).
			pub fn preview(&self) -> String {
				preview(&self.0)
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const PREVIEW_LEN: usize = 8;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (tenant, client).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (tenant, client).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (tenant, client).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { TenantId, "Directory (tenant) identifier used to scope identity-provider endpoints.", "Tenant" }
def_id! { ClientId, "Application (client) identifier registered with the identity provider.", "Client" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

fn preview(value: &str) -> String {
	if value.chars().count() <= PREVIEW_LEN {
		return value.to_owned();
	}

	let mut buf = value.chars().take(PREVIEW_LEN).collect::<String>();

	buf.push('…');

	buf
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_blank_and_padded_values() {
		assert!(TenantId::new("").is_err());
		assert!(TenantId::new(" 72f988bf").is_err(), "Leading whitespace must be rejected.");
		assert!(ClientId::new("client id").is_err());

		let tenant = TenantId::new("72f988bf-86f1-41af-91ab-2d7cd011db47")
			.expect("Tenant fixture should be considered valid.");

		assert_eq!(tenant.as_ref(), "72f988bf-86f1-41af-91ab-2d7cd011db47");
	}

	#[test]
	fn preview_truncates_long_identifiers() {
		let tenant = TenantId::new("72f988bf-86f1-41af-91ab-2d7cd011db47")
			.expect("Tenant fixture should be considered valid.");
		let client = ClientId::new("short").expect("Client fixture should be considered valid.");

		assert_eq!(tenant.preview(), "72f988bf…");
		assert_eq!(client.preview(), "short");
	}

	#[test]
	fn serde_enforces_validation() {
		let client: ClientId =
			serde_json::from_str("\"app-42\"").expect("Client should deserialize successfully.");

		assert_eq!(&*client, "app-42");
		assert!(serde_json::from_str::<ClientId>("\"with space\"").is_err());

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(matches!(TenantId::new(&too_long), Err(IdentifierError::TooLong { .. })));
	}
}
