//! Delegated refresh-token grant.
//!
//! The stored refresh token is exchanged for a fresh access token scoped to the delegated drive
//! permissions. A rotated refresh token is returned on the [`TokenResult`] but never written
//! anywhere by the fetcher.

// self
use crate::{
	_prelude::*,
	auth::{TokenResult, TokenSecret},
	flows::{ClientRegistration, TokenBroker},
	oauth::BasicFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, trace_info},
};

impl TokenBroker {
	/// Exchanges `refresh_token` for an access token carrying the delegated scopes.
	pub async fn refresh_access_token(
		&self,
		registration: ClientRegistration<'_>,
		refresh_token: &TokenSecret,
	) -> Result<TokenResult> {
		const KIND: FlowKind = FlowKind::RefreshToken;

		let span = FlowSpan::new(KIND, "refresh_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let facade = BasicFacade::from_descriptor(
					&self.descriptor,
					registration.tenant,
					registration.client_id,
					registration.client_secret,
					self.http_client.clone(),
				)?;
				let token = facade
					.refresh_token(self.strategy.as_ref(), refresh_token, &self.descriptor.delegated_scope)
					.await?;

				trace_info!(
					tenant = %registration.tenant.preview(),
					rotated = token.rotated_refresh_token(refresh_token).is_some(),
					"Refresh token exchanged for an access token."
				);

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
