mod session;

pub(crate) use session::run_steam_client;
