use async_trait::async_trait;

use super::{GeoPoint, PositionError, PositionSource};

/// Always reports the same position, e.g. coordinates handed in on the
/// command line.
#[derive(Debug, Clone)]
pub struct FixedPositionSource {
    position: GeoPoint,
}

impl FixedPositionSource {
    pub fn new(position: GeoPoint) -> Self {
        Self { position }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn current_position(&self) -> Result<GeoPoint, PositionError> {
        if !self.position.is_valid() {
            return Err(PositionError::Unavailable(format!(
                "invalid coordinates {:?}",
                self.position
            )));
        }
        log::debug!("location: {:?}", self.position);
        Ok(self.position)
    }
}
