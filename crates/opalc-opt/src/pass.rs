//! Pass registration and the pipeline driver.

use opalc_ir::Module;

/// A transform over the module. Passes mutate the module in place and run
/// one at a time, in the order the caller registered them.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&mut self, m: &mut Module);
}

/// Runs passes in registration order.
///
/// In debug builds the module's structural invariants are re-validated after
/// every pass; a violation is an internal compiler error and aborts.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        PassManager { passes: Vec::new() }
    }

    pub fn register<P: Pass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn run(&mut self, m: &mut Module) {
        for pass in &mut self.passes {
            tracing::debug!(pass = pass.name(), "running");
            pass.run(m);
            #[cfg(debug_assertions)]
            m.assert_consistency();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tick(&'static str, std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>);

    impl Pass for Tick {
        fn name(&self) -> &'static str {
            self.0
        }
        fn run(&mut self, _m: &mut Module) {
            self.1.borrow_mut().push(self.0);
        }
    }

    #[test]
    fn passes_run_in_registration_order() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut pm = PassManager::new();
        pm.register(Tick("first", log.clone()));
        pm.register(Tick("second", log.clone()));
        pm.register(Tick("third", log.clone()));
        let mut m = Module::new();
        pm.run(&mut m);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }
}
