use std::process;

use happylife::{
    config::{self, Command, Credentials, PageArg, RealtimeCommand, Settings},
    context::{AppContext, OfflineBackend},
    error::AppError,
    gateway::StoredObject,
    infra::{error::InfraError, telemetry},
    realtime,
    types::{AboutUs, Blog, Collection, ContactInput, ContactMessage, Donation, Event, Record},
    views::{
        AdminActions, AdminDashboardPage, AdminListPage, HomePage, ListPage, MessagesPage,
        Searchable,
    },
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?error.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?error.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    if let Command::Realtime(args) = &cli_args.command {
        return match args.command {
            RealtimeCommand::Install => run_install_triggers(&settings).await,
        };
    }

    let context = build_context(&settings, cli_args.command.credentials())?;
    let actions = AdminActions::new(context.clone());
    if let Some(credentials) = cli_args.command.credentials()
        && let (Some(email), Some(password)) = (&credentials.email, &credentials.password)
    {
        actions.sign_in(email, password).await?;
    }
    let _refresher = context.session().keep_alive();

    match cli_args.command {
        Command::Watch(args) => run_watch(&context, args.page, args.search).await,
        Command::List(args) => run_list(&context, args.collection, args.search).await,
        Command::Show(args) => run_show(&context, args.collection, args.id).await,
        Command::Stats(_) => {
            let mut page = AdminDashboardPage::mount(&context)?;
            page.settled().await;
            print_json(&page.stats())
        }
        Command::Contact(args) => {
            actions
                .submit_contact(ContactInput {
                    name: args.name,
                    email: args.email,
                    subject: args.subject,
                    message: args.message,
                })
                .await
        }
        Command::MarkRead(args) => {
            let message = actions.mark_read(args.id).await?;
            print_json(&message)
        }
        Command::Delete(args) => match args.collection {
            Collection::Donations => actions.delete::<Donation>(args.id).await,
            Collection::Events => actions.delete::<Event>(args.id).await,
            Collection::Blogs => actions.delete::<Blog>(args.id).await,
            Collection::Messages => actions.delete_message(args.id).await,
            Collection::About => Err(AppError::unexpected(
                "the about page can be edited but not deleted",
            )),
        },
        Command::Upload(args) => {
            let object =
                StoredObject::from_path(args.bucket, &args.file, OffsetDateTime::now_utc())
                    .await
                    .map_err(|err| InfraError::io("failed to read upload", err))?;
            let url = context.records().upload(object).await?;
            println!("{url}");
            Ok(())
        }
        Command::Realtime(_) => Ok(()),
    }
}

fn build_context(
    settings: &Settings,
    credentials: Option<&Credentials>,
) -> Result<AppContext, AppError> {
    if !settings.offline {
        return AppContext::connect(settings);
    }

    let accounts = credentials.and_then(|credentials| {
        Some((credentials.email.clone()?, credentials.password.clone()?))
    });
    info!("Using the in-process backend");
    Ok(OfflineBackend::new(settings, accounts).context)
}

async fn run_install_triggers(settings: &Settings) -> Result<(), AppError> {
    let database_url = settings.realtime.database_url.as_deref().ok_or_else(|| {
        config::LoadError::invalid("realtime.database_url", "required to install triggers")
    })?;
    realtime::install_triggers(database_url).await?;
    info!("Realtime triggers installed");
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn print_list<T>(mut page: ListPage<T>, search: Option<String>) -> Result<(), AppError>
where
    T: Searchable + Serialize + Clone + Send + Sync + 'static,
{
    if let Some(error) = page.settled().await.error() {
        return Err(error.clone().into());
    }
    if let Some(search) = search {
        page.set_search(search);
    }
    print_json(page.items().as_slice())
}

async fn run_list(
    context: &AppContext,
    collection: Collection,
    search: Option<String>,
) -> Result<(), AppError> {
    match collection {
        Collection::Donations => print_list(ListPage::donations(context).await?, search).await,
        Collection::Events => print_list(ListPage::events(context).await?, search).await,
        Collection::Blogs => print_list(ListPage::blogs(context).await?, search).await,
        Collection::Messages => {
            let rows = MessagesPage::messages(context)?.load().await?;
            print_json(rows.as_slice())
        }
        Collection::About => {
            let about = context.cache().fetch(&context.catalog().about()).await?;
            print_json(&*about)
        }
    }
}

async fn show<T: Record>(context: &AppContext, id: Uuid) -> Result<(), AppError> {
    match context.records().get::<T>(id).await? {
        Some(record) => print_json(&record),
        None => Err(AppError::unexpected(format!(
            "`{}` record {id} not found",
            T::COLLECTION
        ))),
    }
}

async fn run_show(context: &AppContext, collection: Collection, id: Uuid) -> Result<(), AppError> {
    match collection {
        Collection::Donations => show::<Donation>(context, id).await,
        Collection::Events => show::<Event>(context, id).await,
        Collection::Blogs => show::<Blog>(context, id).await,
        Collection::Messages => show::<ContactMessage>(context, id).await,
        Collection::About => show::<AboutUs>(context, id).await,
    }
}

/// A mounted page the `watch` command can follow.
trait Watched {
    async fn changed(&mut self) -> bool;
    async fn settle(&mut self);
    fn summary(&mut self) -> String;
}

impl Watched for HomePage {
    async fn changed(&mut self) -> bool {
        HomePage::changed(self).await
    }

    async fn settle(&mut self) {
        self.settled().await;
    }

    fn summary(&mut self) -> String {
        let count = |state: Option<usize>| state.map_or("-".to_string(), |n| n.to_string());
        format!(
            "about={:?} donations={} events={} blogs={}",
            self.about().title,
            self.donations().len(),
            count(self.events().data().map(|rows| rows.len())),
            count(self.blogs().data().map(|rows| rows.len())),
        )
    }
}

impl<T> Watched for ListPage<T>
where
    T: Searchable + Clone + Send + Sync + 'static,
{
    async fn changed(&mut self) -> bool {
        ListPage::changed(self).await
    }

    async fn settle(&mut self) {
        self.settled().await;
    }

    fn summary(&mut self) -> String {
        let state = if self.state().is_loading() { "loading" } else { "ready" };
        format!(
            "{state} rows={} search={:?}",
            self.items().len(),
            self.search_query()
        )
    }
}

impl Watched for AdminDashboardPage {
    async fn changed(&mut self) -> bool {
        AdminDashboardPage::changed(self).await
    }

    async fn settle(&mut self) {
        self.settled().await;
    }

    fn summary(&mut self) -> String {
        format!("{:?}", self.stats())
    }
}

impl Watched for MessagesPage {
    async fn changed(&mut self) -> bool {
        AdminListPage::changed(self).await
    }

    async fn settle(&mut self) {
        self.settled().await;
    }

    fn summary(&mut self) -> String {
        format!("messages={} unread={}", self.rows().len(), self.unread())
    }
}

async fn follow<P: Watched>(mut page: P, name: &str) -> Result<(), AppError> {
    page.settle().await;
    info!(page = name, summary = %page.summary(), "Page ready");

    loop {
        tokio::select! {
            changed = page.changed() => {
                if !changed {
                    break;
                }
                info!(page = name, summary = %page.summary(), "Page refreshed");
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| InfraError::io("ctrl-c listener", err))?;
                info!(page = name, "Interrupted");
                break;
            }
        }
    }
    Ok(())
}

async fn run_watch(
    context: &AppContext,
    page: PageArg,
    search: Option<String>,
) -> Result<(), AppError> {
    let search = search.unwrap_or_default();
    match page {
        PageArg::Home => follow(HomePage::mount(context).await?, "home").await,
        PageArg::Donations => {
            let mut page = ListPage::donations(context).await?;
            page.set_search(search);
            follow(page, "donations").await
        }
        PageArg::Events => {
            let mut page = ListPage::events(context).await?;
            page.set_search(search);
            follow(page, "events").await
        }
        PageArg::Blogs => {
            let mut page = ListPage::blogs(context).await?;
            page.set_search(search);
            follow(page, "blogs").await
        }
        PageArg::Dashboard => follow(AdminDashboardPage::mount(context)?, "dashboard").await,
        PageArg::Messages => follow(MessagesPage::messages(context)?, "messages").await,
    }
}
