//! OAuth 2.0 grant identifiers and their wire names.

// self
use crate::_prelude::*;

/// OAuth 2.0 grants performed by the fetcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Refresh Token grant acting for a signed-in user.
	RefreshToken,
	/// Client Credentials grant for app-only tokens.
	ClientCredentials,
	/// Device Authorization grant (RFC 8628) used by the one-time setup.
	DeviceCode,
}
impl GrantType {
	/// Returns the wire identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::RefreshToken => "refresh_token",
			GrantType::ClientCredentials => "client_credentials",
			GrantType::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
		}
	}

	/// Short label used in diagnostics.
	pub fn label(self) -> &'static str {
		match self {
			GrantType::DeviceCode => "device_code",
			other => other.as_str(),
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.label())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn device_code_uses_urn_on_the_wire() {
		assert_eq!(GrantType::DeviceCode.as_str(), "urn:ietf:params:oauth:grant-type:device_code");
		assert_eq!(GrantType::DeviceCode.to_string(), "device_code");
		assert_eq!(GrantType::RefreshToken.to_string(), "refresh_token");
	}
}
