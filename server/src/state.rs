//! Application state

use std::{any::type_name, ops::Deref, sync::Arc};

use type_map::concurrent::TypeMap;

use crate::{config::AppConfig, contacts::ContactDirectory, rate_limit::RateLimiter};

/// App state stored in the Axum router
#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);

pub struct AppStateInner {
    pub config: AppConfig,
    pub directory: Arc<dyn ContactDirectory>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        directory: Arc<dyn ContactDirectory>,
        limiter: RateLimiter,
    ) -> Self {
        Self(Arc::new(AppStateInner {
            config,
            directory,
            limiter,
        }))
    }
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<TypeMap> for AppState {
    type Error = anyhow::Error;

    fn try_from(mut map: TypeMap) -> Result<Self, Self::Error> {
        Ok(Self::new(
            extract(&mut map)?,
            extract(&mut map)?,
            extract(&mut map)?,
        ))
    }
}

fn extract<T: 'static>(type_map: &mut TypeMap) -> anyhow::Result<T> {
    type_map
        .remove()
        .ok_or_else(|| anyhow::anyhow!("Type not found in state: {}", type_name::<T>()))
}
