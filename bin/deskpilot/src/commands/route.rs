use deskpilot_core::Paths;

use super::App;

pub async fn run(paths: &Paths, message: &str, assisted: bool) -> anyhow::Result<()> {
    let app = App::bootstrap(paths)?;
    let router = app.runtime.router();
    let intent = if assisted {
        router
            .route_assisted(message, app.runtime.providers(), app.runtime.config().routing_model())
            .await
    } else {
        router.route(message)
    };

    println!("Primary:    {}", intent.primary());
    println!("Confidence: {:.2}", intent.confidence());
    println!("Modules:    {}", intent.modules().join(", "));
    Ok(())
}
