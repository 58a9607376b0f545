use anyhow::Result;
use crate::event::Event;
use super::Filter;

pub struct Nop {
    name: String,
}

impl Nop {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl Filter for Nop {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self, event: Event) -> Result<Event> {
        Ok(event)
    }
}
