/// Runs a closure when dropped, on every return path of the enclosing scope.
pub struct Defer<F>
where
    F: FnMut(),
{
    f: F,
}

impl<F> Defer<F>
where
    F: FnMut(),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Drop for Defer<F>
where
    F: FnMut(),
{
    fn drop(&mut self) {
        (self.f)();
    }
}
