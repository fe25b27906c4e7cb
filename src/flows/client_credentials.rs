//! Application-only client-credentials grant.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, TenantId, TokenResult, TokenSecret},
	flows::TokenBroker,
	oauth::BasicFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, trace_info},
};

impl TokenBroker {
	/// Performs the `client_credentials` grant for the application scope.
	pub async fn client_credentials(
		&self,
		tenant: &TenantId,
		client_id: &ClientId,
		client_secret: &TokenSecret,
	) -> Result<TokenResult> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let span = FlowSpan::new(KIND, "client_credentials");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let facade = BasicFacade::from_descriptor(
					&self.descriptor,
					tenant,
					client_id,
					Some(client_secret),
					self.http_client.clone(),
				)?;
				let token = facade
					.exchange_client_credentials(
						self.strategy.as_ref(),
						&self.descriptor.application_scope,
					)
					.await?;

				trace_info!(client = %client_id.preview(), "Application token issued.");

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
