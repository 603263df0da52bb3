use crate::error::AppError;
use crate::models::session::{Role, Session};
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    DriverHome,
    CustomerHome,
}

impl Route {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Driver => Route::DriverHome,
            Role::Customer => Route::CustomerHome,
        }
    }

    pub fn for_session(session: Option<&Session>) -> Self {
        session.map_or(Route::Login, |session| Route::for_role(session.role))
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/",
            Route::DriverHome => DriverTab::Home.path(),
            Route::CustomerHome => "/pelanggan/beranda",
        }
    }
}

/// Bottom navigation of the driver screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverTab {
    Home,
    History,
    Profile,
}

impl DriverTab {
    pub const ALL: [DriverTab; 3] = [DriverTab::Home, DriverTab::History, DriverTab::Profile];

    pub fn path(self) -> &'static str {
        match self {
            DriverTab::Home => "/driver/beranda",
            DriverTab::History => "/driver/riwayat",
            DriverTab::Profile => "/driver/profil",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DriverTab::Home => "Beranda",
            DriverTab::History => "Riwayat",
            DriverTab::Profile => "Profil",
        }
    }

    /// A tab is active on its own path and on anything nested under it.
    pub fn is_active(self, current_path: &str) -> bool {
        let path = self.path();
        current_path == path
            || current_path
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Launch decision: a restored session skips the login screen.
pub async fn initial_route(store: &SessionStore) -> Result<Route, AppError> {
    let session = store.restore().await?;
    Ok(Route::for_session(session.as_ref()))
}
