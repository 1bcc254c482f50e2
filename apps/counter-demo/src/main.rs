use trellis_core::{
    cleanup, deps, element, Context, Descriptor, FunctionComponent, MemoryHost, Renderer,
};
use trellis_runtime_std::StdRuntime;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Theme {
    Light,
    Dark,
}

impl Theme {
    fn class(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

fn counter_component(theme: &Context<Theme>) -> FunctionComponent {
    let theme = theme.clone();
    FunctionComponent::new("Counter", move |hooks, props| {
        let step = props.get_int("step").unwrap_or(1);
        let (count, set_count) = hooks.use_state(|| 0_i64);
        let current = *hooks.use_context(&theme);

        hooks.use_effect(
            move || {
                log::info!("count is now {count}");
                cleanup(move || log::debug!("leaving count {count}"))
            },
            deps![count],
        );

        let increment = set_count.clone();
        let decrement = set_count;
        element("div")
            .prop("class", current.class())
            .child(
                element("button")
                    .on("click", move || increment.update(move |c| c + step))
                    .text("+"),
            )
            .child(element("span").text(count.to_string()))
            .child(
                element("button")
                    .on("click", move || decrement.update(move |c| c - step))
                    .text("-"),
            )
            .build()
    })
}

fn todo_list() -> FunctionComponent {
    FunctionComponent::new("TodoList", |hooks, _| {
        let (items, set_items) = hooks.use_state(|| vec!["write", "test", "ship"]);
        let reverse = set_items.clone();
        let rows = items
            .iter()
            .map(|item| element("li").key(*item).text(*item).build());
        element("section")
            .child(
                element("button")
                    .on("click", move || {
                        reverse.update(|items| items.iter().rev().copied().collect())
                    })
                    .text("reverse"),
            )
            .child(element("ul").children(rows))
            .build()
    })
}

fn app(
    theme: &Context<Theme>,
    value: Theme,
    counter: &FunctionComponent,
    todos: &FunctionComponent,
) -> Descriptor {
    theme
        .provider(value)
        .child(element("h1").text("trellis"))
        .child(counter.element().prop("step", 2))
        .child(todos.element())
        .build()
}

fn click(renderer: &Renderer<MemoryHost>, tag: &str, index: usize) {
    let container = renderer.container();
    let handler = renderer.with_host(|host| {
        host.find_by_tag(container, tag)
            .get(index)
            .and_then(|&node| host.handler(node, "click"))
    });
    match handler {
        Some(handler) => handler(),
        None => log::warn!("no click handler on {tag}[{index}]"),
    }
}

fn print_tree(label: &str, renderer: &Renderer<MemoryHost>) {
    let container = renderer.container();
    println!("{label}:");
    println!("  {}", renderer.with_host(|host| host.inner_html(container)));
}

fn main() {
    env_logger::init();

    println!("=== trellis counter demo ===");
    println!("Renders into an in-memory host and simulates clicks.");
    println!();

    let runtime = StdRuntime::new();
    let mut host = MemoryHost::new();
    let container = host.create_container("app");
    let renderer = Renderer::new(host, container, runtime.scheduler());

    let theme = Context::new(Theme::Light);
    let counter = counter_component(&theme);
    let todos = todo_list();

    renderer.update_root(app(&theme, Theme::Light, &counter, &todos));
    runtime.run_until_idle();
    print_tree("initial", &renderer);

    click(&renderer, "button", 0);
    click(&renderer, "button", 0);
    runtime.run_until_idle();
    print_tree("after two increments", &renderer);

    renderer.batched_updates(|| {
        click(&renderer, "button", 1);
        click(&renderer, "button", 2);
    });
    runtime.run_until_idle();
    print_tree("after decrement and reverse", &renderer);

    renderer.update_root(app(&theme, Theme::Dark, &counter, &todos));
    if let Err(err) = renderer.flush_sync() {
        eprintln!("render failed: {err}");
        return;
    }
    runtime.run_until_idle();
    print_tree("dark theme", &renderer);

    match renderer.snapshot() {
        Ok(snapshot) => println!("work nodes in committed tree: {}", snapshot.count()),
        Err(err) => eprintln!("snapshot failed: {err}"),
    }

    if let Err(err) = renderer.unmount() {
        eprintln!("unmount failed: {err}");
    }
    print_tree("unmounted", &renderer);
}
