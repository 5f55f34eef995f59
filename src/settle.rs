/// Single-assignment result cell for one asynchronous operation.
///
/// Whichever resolver reaches [`SettleCell::settle`] first commits the
/// outcome; every later resolver for the same operation is a no-op. Timer
/// cancellation and queued events are not atomic with respect to each other,
/// so losers of a race must go through this guard instead of mutating state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleCell<T> {
    value: Option<T>,
}

impl<T> Default for SettleCell<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> SettleCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits `value` if nothing has been committed yet. Returns whether it won.
    pub fn settle(&mut self, value: T) -> bool {
        if self.value.is_some() {
            return false;
        }
        self.value = Some(value);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.value.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Re-arms the cell for a new operation
    pub fn reset(&mut self) {
        self.value = None;
    }
}
