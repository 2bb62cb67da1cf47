use crate::http::request::Request;
use crate::http::response::Response;

/// Application callback invoked once per parsed request.
///
/// The handler fills in `res` and returns the status code to send. A
/// negative return value reports a handler failure and is answered with
/// 500, keeping whatever headers and body were already set.
///
/// One handler instance is shared by every worker thread, hence the
/// `Send + Sync` bound. Closures of the right shape implement it directly:
///
/// ```
/// # use lantern::http::handler::Handler;
/// # use lantern::http::request::Request;
/// # use lantern::http::response::Response;
/// fn assert_handler<H: Handler>(_: H) {}
/// assert_handler(|_: &Request, res: &mut Response| {
///     res.set_body_static(b"ok");
///     200
/// });
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: &Request, res: &mut Response) -> i32;
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut Response) -> i32 + Send + Sync + 'static,
{
    fn handle(&self, req: &Request, res: &mut Response) -> i32 {
        self(req, res)
    }
}
