//! Interactive console: reads commands from stdin, mounts views per route,
//! prints rendered views, toasts and notifications.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app_system::AppContext;
use crate::clients::OrderListClient;
use crate::domain::{Credentials, StatusAction};
use crate::notifications::{setup_notifications, ConsoleNotifier, NotificationCenter, NotificationTask};
use crate::router::Route;
use crate::views::render::render_order_list;
use crate::views::{LayoutState, LoginView, OrderListService, OrderListSnapshot, ProtectedLayout};

pub const HELP: &str = "\
Commands:
  login <email> <password>   sign in
  go <path>                  open /, /processing or /completed
  refresh                    reload the current list
  process <id>               pending -> processing
  cancel <id>                pending -> cancelled
  complete <id>              processing -> completed
  click <n>                  click notification n
  signout                    sign out
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { email: String, password: String },
    Go(String),
    Refresh,
    Action { action: StatusAction, id: String },
    Click(u64),
    SignOut,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let one = |usage: &str| match args.as_slice() {
            [arg] => Ok(arg.to_string()),
            _ => Err(format!("usage: {}", usage)),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "login" => match args.as_slice() {
                [email, password] => Command::Login {
                    email: email.to_string(),
                    password: password.to_string(),
                },
                _ => return Err("usage: login <email> <password>".to_string()),
            },
            "go" => Command::Go(one("go <path>")?),
            "refresh" => Command::Refresh,
            "process" => Command::Action { action: StatusAction::Process, id: one("process <id>")? },
            "cancel" => Command::Action { action: StatusAction::Cancel, id: one("cancel <id>")? },
            "complete" => Command::Action { action: StatusAction::Complete, id: one("complete <id>")? },
            "click" => Command::Click(
                one("click <n>")?
                    .parse()
                    .map_err(|_| "usage: click <n>".to_string())?,
            ),
            "signout" | "logout" => Command::SignOut,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command: {} (try help)", other)),
        };
        Ok(Some(command))
    }
}

enum ViewEvent {
    Session(LayoutState),
    ListChanged,
    Closed,
}

/// A protected route currently on screen.
struct MountedView {
    layout: ProtectedLayout,
    list: OrderListClient,
    list_state: watch::Receiver<OrderListSnapshot>,
}

impl MountedView {
    async fn next_event(&mut self) -> ViewEvent {
        tokio::select! {
            change = self.layout.next_change() => match change {
                Some(state) => ViewEvent::Session(state.clone()),
                None => ViewEvent::Closed,
            },
            changed = self.list_state.changed() => match changed {
                Ok(()) => ViewEvent::ListChanged,
                Err(_) => ViewEvent::Closed,
            },
        }
    }

    /// Chrome plus the list as it stands, including the loading line.
    fn render(&mut self) -> Option<String> {
        let snapshot = self.list_state.borrow_and_update().clone();
        let chrome = self.layout.render_chrome()?;
        Some(format!("{}\n{}", chrome, render_order_list(&snapshot)))
    }
}

async fn next_view_event(mounted: &mut Option<MountedView>) -> ViewEvent {
    match mounted {
        Some(view) => view.next_event().await,
        None => std::future::pending().await,
    }
}

pub struct Shell {
    ctx: AppContext,
    notifier: Option<Arc<ConsoleNotifier>>,
    notification_icon: String,
    notifications: Option<NotificationTask>,
    current: Option<Route>,
    mounted: Option<MountedView>,
}

impl Shell {
    pub fn new(ctx: AppContext, notifier: Option<Arc<ConsoleNotifier>>, notification_icon: String) -> Self {
        Self {
            ctx,
            notifier,
            notification_icon,
            notifications: None,
            current: None,
            mounted: None,
        }
    }

    pub async fn run(mut self) -> Result<(), String> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut toasts = self.ctx.toaster.subscribe();
        let mut routes = self.ctx.navigator.subscribe();

        self.enable_notifications().await;
        let start = *routes.borrow_and_update();
        self.enter(start).await;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !self.execute_line(&line).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(format!("Failed to read input: {}", e)),
                },
                toast = toasts.recv() => {
                    if let Ok(toast) = toast {
                        println!("{}", toast);
                    }
                }
                changed = routes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let route = *routes.borrow_and_update();
                    self.enter(route).await;
                }
                event = next_view_event(&mut self.mounted) => self.on_view_event(event).await,
            }
        }

        self.unmount().await;
        info!("Console closed");
        Ok(())
    }

    /// Returns false when the console should exit.
    async fn execute_line(&mut self, line: &str) -> bool {
        match Command::parse(line) {
            Ok(Some(Command::Quit)) => false,
            Ok(Some(command)) => {
                self.execute(command).await;
                true
            }
            Ok(None) => true,
            Err(message) => {
                println!("{}", message);
                true
            }
        }
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Login { email, password } => {
                let navigator = self.ctx.navigator.clone();
                let login = LoginView::new(&self.ctx);
                match login
                    .submit(Credentials::new(email, password), move || {
                        navigator.navigate(Route::NewOrders.path());
                    })
                    .await
                {
                    Ok(user) => {
                        println!("Signed in as {}", user.email);
                        self.enable_notifications().await;
                    }
                    Err(e) => println!("Login failed: {}", e),
                }
            }
            Command::Go(path) => {
                self.ctx.navigator.navigate(&path);
            }
            Command::Refresh => match &self.mounted {
                Some(view) => {
                    let _ = view.list.refresh().await;
                }
                None => println!("Nothing to refresh here"),
            },
            Command::Action { action, id } => match &self.mounted {
                Some(view) => {
                    let _ = view.list.update_status(id, action.target()).await;
                }
                None => println!("Sign in to manage orders"),
            },
            Command::Click(id) => {
                let Some(notifier) = &self.notifier else {
                    println!("Notifications are off");
                    return;
                };
                if !notifier.click(id) {
                    let open: Vec<String> = notifier.visible().iter().map(|(n, _)| n.to_string()).collect();
                    if open.is_empty() {
                        println!("No notification {}", id);
                    } else {
                        println!("No notification {} (open: {})", id, open.join(", "));
                    }
                }
            }
            Command::SignOut => match &self.mounted {
                Some(view) => view.layout.sign_out().await,
                None => println!("Not signed in"),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    async fn on_view_event(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::ListChanged => {
                if let Some(text) = self.mounted.as_mut().and_then(MountedView::render) {
                    println!("{}", text);
                }
            }
            ViewEvent::Session(LayoutState::Authenticated(user)) => {
                debug!(user_id = %user.id, "Session still valid");
            }
            // The layout has already redirected to the login route.
            ViewEvent::Session(_) => {}
            ViewEvent::Closed => {
                warn!("Mounted view closed unexpectedly");
                self.unmount().await;
            }
        }
    }

    async fn enter(&mut self, route: Route) {
        if self.current == Some(route) && (route == Route::Login || self.mounted.is_some()) {
            return;
        }
        // Between protected routes the layout stays; only the filter moves.
        if let (Some(view), Some(props)) = (&self.mounted, route.list_props()) {
            self.current = Some(route);
            if let Err(e) = view.list.set_props(props).await {
                warn!(error = %e, "Failed to switch order filter");
            }
            return;
        }
        self.unmount().await;
        self.current = Some(route);

        let Some(props) = route.list_props() else {
            println!("{}", LoginView::new(&self.ctx).render());
            return;
        };

        let mut layout = ProtectedLayout::mount(&self.ctx);
        match layout.resolve().await {
            LayoutState::Authenticated(_) => {
                let (list, _handle) = OrderListService::mount(&self.ctx, props);
                let list_state = list.watch();
                self.mounted = Some(MountedView { layout, list, list_state });
            }
            // Redirect already issued; the route change will land on /login.
            LayoutState::Unauthenticated | LayoutState::Loading => {}
        }
    }

    async fn unmount(&mut self) {
        if let Some(view) = self.mounted.take() {
            let _ = view.list.unmount().await;
        }
    }

    async fn enable_notifications(&mut self) {
        if self.notifications.as_ref().is_some_and(NotificationTask::is_running) {
            return;
        }
        let center = self
            .notifier
            .clone()
            .map(|notifier| notifier as Arc<dyn NotificationCenter>);
        self.notifications = setup_notifications(&self.ctx, center, &self.notification_icon).await;
    }
}
