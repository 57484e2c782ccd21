//! Wires an `AuthFlowController` the way a bot host would and prints the admin-consent
//! redirect together with the state cookie it plants.
//!
//! Set `BOT_APP_ID`, `BOT_APP_SECRET`, and `BOT_ROOT_URI` to try it against a real registration.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use oidc_bot_auth::{
	auth::Principal,
	config::AuthConfig,
	flows::{AuthEvents, AuthRequest, Endpoint, ReqwestAuthFlowController},
	store::{MemoryStore, TokenStore},
};

struct PrintEvents;
impl AuthEvents for PrintEvents {
	fn on_login(&self, principal: &Principal) {
		println!("Signed in {principal}.");
	}

	fn on_admin_consent(&self, tenant: Option<&str>) {
		println!("Consent granted for tenant {}.", tenant.unwrap_or("<unknown>"));
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let var = |name: &str, fallback: &str| env::var(name).unwrap_or_else(|_| fallback.into());
	let config = AuthConfig::builder(
		var("BOT_APP_ID", "00000000-0000-0000-0000-000000000000"),
		var("BOT_APP_SECRET", "demo-secret"),
		var("BOT_ROOT_URI", "https://bot.example.com"),
	)
	.build()?;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let controller = ReqwestAuthFlowController::with_config(Arc::new(config), store)?
		.with_events(Arc::new(PrintEvents));

	for (path, endpoint) in controller.routes() {
		println!("Mount {path} -> {endpoint}.");
	}

	let response = controller.handle(Endpoint::AdminConsent, &AuthRequest::default()).await;

	println!("HTTP {}", response.status());

	for (name, value) in response.headers() {
		println!("{name}: {value}");
	}

	// Without the cookie the return is refused before anything reaches the provider.
	let forged = controller
		.handle(Endpoint::AdminToken, &AuthRequest::new("admin_consent=True&state=guess", None))
		.await;

	println!("Return without the state cookie: HTTP {} ({}).", forged.status(), forged.body());

	Ok(())
}
