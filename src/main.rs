use lantern::config::Config;
use lantern::{Method, Request, Response};

fn hello(req: &Request, res: &mut Response) -> i32 {
    if req.method != Method::GET {
        return 404;
    }
    res.set_body_static(b"hello world");
    res.header("content-type", "text/raw");
    200
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    // Only returns once the server cannot go on.
    let err = lantern::serve(&cfg, hello);
    Err(err.into())
}
