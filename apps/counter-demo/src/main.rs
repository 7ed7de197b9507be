use std::process::ExitCode;

use fiber_core::{use_effect, use_state, Element, Props, Scheduler};
use fiber_runtime_std::{DriveError, StdRuntime};
use fiber_testing::MemoryHost;
use tracing_subscriber::EnvFilter;

fn counter(_: &Props) -> Element {
    let (count, set_count) = use_state(|| 0);
    let (show_details, set_show_details) = use_state(|| false);

    use_effect(
        move |scope| {
            tracing::info!(count, "count changed");
            scope.on_cleanup(move || tracing::info!(count, "leaving count"))
        },
        count,
    );

    let increment = set_count.clone();
    let decrement = set_count;
    let toggle = set_show_details;

    let mut root = Element::host("div")
        .attr("class", "counter")
        .child(Element::host("h1").child(format!("Count: {count}")))
        .child(
            Element::host("button")
                .attr("id", "inc")
                .on("click", move |_| increment.update(|c| c + 1))
                .child("+"),
        )
        .child(
            Element::host("button")
                .attr("id", "dec")
                .on("click", move |_| decrement.update(|c| c - 1))
                .child("-"),
        )
        .child(
            Element::host("button")
                .attr("id", "toggle")
                .on("click", move |_| toggle.update(|shown| !shown))
                .child("details"),
        );
    if show_details {
        root = root.child(Element::component(details).attr("count", count as i64));
    }
    root
}

fn details(props: &Props) -> Element {
    let count = props.int("count").unwrap_or_default();
    use_effect(
        |scope| {
            tracing::info!("details mounted");
            scope.on_cleanup(|| tracing::info!("details unmounted"))
        },
        (),
    );
    Element::host("p")
        .style("color", if count < 0 { "red" } else { "green" })
        .child(if count % 2 == 0 { "even" } else { "odd" })
}

fn click(
    runtime: &StdRuntime,
    scheduler: &mut Scheduler<MemoryHost>,
    id: &str,
) -> Result<(), DriveError> {
    let button = scheduler
        .adapter()
        .find_all("button")
        .into_iter()
        .find(|&node| {
            scheduler
                .adapter()
                .attribute(node, "id")
                .and_then(|value| value.as_str())
                == Some(id)
        });
    match button {
        Some(button) => {
            println!("> click #{id}");
            scheduler.adapter().dispatch_event(button, "click");
        }
        None => tracing::warn!(id, "no such button"),
    }
    runtime.run_until_idle(scheduler)?;
    Ok(())
}

fn run() -> Result<(), DriveError> {
    let runtime = StdRuntime::new();
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let mut scheduler = runtime.create_scheduler(host);

    scheduler.render(Element::component(counter), container);
    let turns = runtime.run_until_idle(&mut scheduler)?;
    tracing::debug!(turns, "mounted");
    print!("{}", scheduler.adapter().dump_tree(Some(container)));

    for id in ["inc", "inc", "toggle", "dec", "dec", "dec", "toggle"] {
        click(&runtime, &mut scheduler, id)?;
        print!("{}", scheduler.adapter().dump_tree(Some(container)));
    }

    scheduler.unmount();
    runtime.run_until_idle(&mut scheduler)?;
    print!("{}", scheduler.adapter().dump_tree(Some(container)));
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "counter demo failed");
            ExitCode::FAILURE
        }
    }
}
