use {
    serenity::{
        all::{
            ButtonStyle,
            CommandDataOptionValue,
            CommandInteraction,
            CommandOptionType,
            CommandType,
            ComponentInteraction,
            Context,
            CreateActionRow,
            CreateAllowedMentions,
            CreateButton,
            CreateCommand,
            CreateCommandOption,
            CreateInteractionResponse,
            CreateInteractionResponseMessage,
            EditInteractionResponse,
            EventHandler,
            Guild,
            Interaction,
            InteractionContext,
            Message,
            MessageBuilder,
            Permissions,
            Ready,
        },
    },
    crate::{
        account,
        extract::{
            self,
            MatchExtractor,
        },
        identity::{
            self,
            IdentityVerifier,
        },
        nav::{
            self,
            NavToken,
            PageAction,
            PageToken,
            SortToken,
        },
        pending::{
            ConfirmError,
            Decision,
            PendingConfirmations,
            Ticket,
        },
        prelude::*,
        ranking::{
            self,
            Page,
            RankingCriterion,
        },
        register::{
            self,
            MatchLedgerEntry,
        },
        stats,
        submission::{
            MATCH_SIZE,
            MatchSubmission,
            PlayerEntry,
            TeamLabel,
            UnknownTeamLabel,
        },
        wizard::{
            self,
            SessionStore,
        },
        worker::WorkerPool,
    },
};

const ROLES: [&str; 5] = ["TOP", "JUNGLE", "MID", "ADC", "SUPPORT"];
const PROFILE_ROWS: usize = 5;
const SORT_BUTTONS_PER_ROW: usize = 3;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Account(#[from] account::Error),
    #[error(transparent)] Extract(#[from] extract::Error),
    #[error(transparent)] Identity(#[from] identity::Error),
    #[error(transparent)] Nav(#[from] nav::DecodeError),
    #[error(transparent)] Register(#[from] register::Error),
    #[error(transparent)] Serenity(#[from] serenity::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Team(#[from] UnknownTeamLabel),
    #[error(transparent)] Wizard(#[from] wizard::Error),
    #[error("this command can only be used in a server")]
    NoGuild,
    #[error("missing or invalid option: {0}")]
    Option(&'static str),
    #[error("the attachment is not an image")]
    NotAnImage,
    #[error("unknown command or button: {0}")]
    Unknown(String),
}

impl Error {
    /// Errors the user can't do anything about, logged as such.
    fn is_internal(&self) -> bool {
        match self {
            Self::Serenity(_) | Self::Sql(_) | Self::Unknown(_) => true,
            Self::Account(account::Error::Sql(_)) | Self::Identity(identity::Error::Sql(_) | identity::Error::Account(account::Error::Sql(_))) => true,
            Self::Register(register::Error::Sql(_) | register::Error::Account(account::Error::Sql(_))) => true,
            Self::Account(account::Error::OwnershipConflict { .. })
            | Self::Extract(_)
            | Self::Identity(_)
            | Self::Nav(_)
            | Self::Register(_)
            | Self::Team(_)
            | Self::Wizard(_)
            | Self::NoGuild
            | Self::Option(_)
            | Self::NotAnImage => false,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Wizard(wizard::Error::SessionConflict) => format!("You already have a match entry in progress. Finish it or use `/match-cancel` first."),
            Self::Wizard(wizard::Error::SessionNotFound) => format!("You have no match entry in progress. Start one with `/match-start`."),
            Self::Register(register::Error::ValidationFailed { missing }) => MessageBuilder::default()
                .push_line("These accounts are not registered in this server:")
                .push_line_safe(missing.join(", "))
                .push("Their owners can use `/register`, or a moderator can add them with `/add-account`.")
                .build(),
            Self::Account(account::Error::OwnershipConflict { name, tag, owner })
            | Self::Identity(identity::Error::Account(account::Error::OwnershipConflict { name, tag, owner })) => MessageBuilder::default()
                .push_safe(format!("{name}#{tag}"))
                .push(" is already linked to ")
                .mention(owner)
                .push(". Please ask a moderator for help.")
                .build(),
            Self::Identity(identity::Error::Verify(identity::VerifyError::Reqwest(_))) => format!("Riot's account service could not be reached. Please try again later."),
            Self::Extract(extract::Error::Reqwest(_) | extract::Error::Json(_)) => format!("The screenshot could not be analyzed right now. Please try again later."),
            Self::Nav(_) => format!("This leaderboard is outdated. Please run `/ranking` again."),
            e if e.is_internal() => format!("Sorry, something went wrong. Please try again later."),
            e => e.to_string(),
        }
    }
}

#[async_trait]
trait GenericInteraction: Sync {
    fn guild_id(&self) -> Option<GuildId>;
    fn user_id(&self) -> UserId;
    async fn create_response(&self, ctx: &Context, builder: CreateInteractionResponse) -> serenity::Result<()>;
    async fn edit_response(&self, ctx: &Context, builder: EditInteractionResponse) -> serenity::Result<Message>;
}

#[async_trait]
impl GenericInteraction for CommandInteraction {
    fn guild_id(&self) -> Option<GuildId> { self.guild_id }
    fn user_id(&self) -> UserId { self.user.id }

    async fn create_response(&self, ctx: &Context, builder: CreateInteractionResponse) -> serenity::Result<()> {
        self.create_response(ctx, builder).await
    }

    async fn edit_response(&self, ctx: &Context, builder: EditInteractionResponse) -> serenity::Result<Message> {
        self.edit_response(ctx, builder).await
    }
}

#[async_trait]
impl GenericInteraction for ComponentInteraction {
    fn guild_id(&self) -> Option<GuildId> { self.guild_id }
    fn user_id(&self) -> UserId { self.user.id }

    async fn create_response(&self, ctx: &Context, builder: CreateInteractionResponse) -> serenity::Result<()> {
        self.create_response(ctx, builder).await
    }

    async fn edit_response(&self, ctx: &Context, builder: EditInteractionResponse) -> serenity::Result<Message> {
        self.edit_response(ctx, builder).await
    }
}

async fn reply(ctx: &Context, interaction: &impl GenericInteraction, content: impl Into<String>) -> serenity::Result<()> {
    interaction.create_response(ctx, CreateInteractionResponse::Message(CreateInteractionResponseMessage::new()
        .ephemeral(true)
        .allowed_mentions(CreateAllowedMentions::new())
        .content(content)
    )).await
}

/// Shows an error to the user who caused it. Works whether or not the interaction was already answered.
async fn report(ctx: &Context, interaction: &impl GenericInteraction, e: Error) {
    if e.is_internal() {
        log::error!("error handling interaction from {}: {e} ({e:?})", interaction.user_id());
    } else {
        log::info!("rejected interaction from {}: {e}", interaction.user_id());
    }
    let content = e.user_message();
    if reply(ctx, interaction, content.clone()).await.is_err() {
        if let Err(e) = interaction.edit_response(ctx, EditInteractionResponse::new().content(content).components(Vec::default())).await {
            log::error!("failed to report error to {}: {e}", interaction.user_id());
        }
    }
}

fn guild(interaction: &impl GenericInteraction) -> Result<GuildId, Error> {
    interaction.guild_id().ok_or(Error::NoGuild)
}

fn option<'a>(interaction: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOptionValue> {
    interaction.data.options.iter().find(|option| option.name == name).map(|option| &option.value)
}

fn string_option<'a>(interaction: &'a CommandInteraction, name: &'static str) -> Result<Option<&'a str>, Error> {
    match option(interaction, name) {
        None => Ok(None),
        Some(CommandDataOptionValue::String(value)) => Ok(Some(value)),
        Some(_) => Err(Error::Option(name)),
    }
}

fn required_string<'a>(interaction: &'a CommandInteraction, name: &'static str) -> Result<&'a str, Error> {
    string_option(interaction, name)?.ok_or(Error::Option(name))
}

fn count_option(interaction: &CommandInteraction, name: &'static str) -> Result<Option<u32>, Error> {
    match option(interaction, name) {
        None => Ok(None),
        Some(&CommandDataOptionValue::Integer(value)) => u32::try_from(value).map(Some).map_err(|_| Error::Option(name)),
        Some(_) => Err(Error::Option(name)),
    }
}

fn required_count(interaction: &CommandInteraction, name: &'static str) -> Result<u32, Error> {
    count_option(interaction, name)?.ok_or(Error::Option(name))
}

fn confirmation_buttons(ticket: Ticket) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(ticket.custom_id(Decision::Confirm)).label("Confirm").style(ButtonStyle::Success),
        CreateButton::new(ticket.custom_id(Decision::Discard)).label("Discard").style(ButtonStyle::Danger),
    ])
}

fn ledger_summary(entry: &MatchLedgerEntry) -> String {
    let mut content = MessageBuilder::default();
    content.push_bold_line(format!("Match #{} registered, {} won.", entry.id, entry.winning_team));
    for team in all::<TeamLabel>() {
        let won = entry.players.iter().any(|player| player.team == team && player.win);
        content.push_line(format!("{team}{}:", if won { " (victory)" } else { "" }));
        for player in entry.players.iter().filter(|player| player.team == team) {
            content.push("- ").push_safe(player.account.riot_id()).push(format!(" {}/{}/{}", player.kills, player.deaths, player.assists));
            match (&player.champion, &player.role) {
                (Some(champion), Some(role)) => { content.push(" as ").push_safe(champion).push(" ").push_safe(role); }
                (Some(name), None) | (None, Some(name)) => { content.push(" as ").push_safe(name); }
                (None, None) => {}
            }
            if let Some(gold) = player.gold {
                content.push(format!(", {gold} gold"));
            }
            if let Some(damage) = player.damage {
                content.push(format!(", {damage} damage"));
            }
            if let Some(owner) = player.account.owner() {
                content.push(" ").mention(&owner);
            }
            content.push_line("");
        }
    }
    if let Some(duration) = entry.players.iter().find_map(|player| player.duration_seconds) {
        content.push_line(format!("Game length: {}:{:02}", duration / 60, duration % 60));
    }
    content.push_italic(format!("Registered {}", entry.registered_at.format("%Y-%m-%d %H:%M UTC")));
    content.build()
}

/// Moves a complete wizard session into the pending map, before anything is sent to Discord.
fn queue_wizard_match(sessions: &SessionStore, pending: &PendingConfirmations, user: UserId) -> Result<Ticket, wizard::Error> {
    let submission = sessions.assemble(user)?;
    Ok(pending.insert(user, submission))
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn commands() -> Vec<CreateCommand> {
    let name = || CreateCommandOption::new(CommandOptionType::String, "name", "Riot ID name, the part before the #").required(true);
    let tag = || CreateCommandOption::new(CommandOptionType::String, "tag", "Riot ID tag, the part after the #").required(true);
    let count = |option_name: &str, description: &str, required: bool| CreateCommandOption::new(CommandOptionType::Integer, option_name, description)
        .min_int_value(0)
        .required(required);
    let guild_command = |command_name: &str, description: &str| CreateCommand::new(command_name)
        .kind(CommandType::ChatInput)
        .add_context(InteractionContext::Guild)
        .description(description);
    let mut role = CreateCommandOption::new(CommandOptionType::String, "role", "The role the player played");
    for role_name in ROLES {
        role = role.add_string_choice(role_name, role_name);
    }
    let mut criterion = CreateCommandOption::new(CommandOptionType::String, "criterion", "What to rank by (default: win rate)");
    for ranking_criterion in all::<RankingCriterion>() {
        criterion = criterion.add_string_choice(ranking_criterion.label(), ranking_criterion.name());
    }
    vec![
        guild_command("match-start", "Start entering a match result player by player")
            .add_option(CreateCommandOption::new(CommandOptionType::String, "winner", "The team that won")
                .required(true)
                .add_string_choice("Team A", TeamLabel::TeamA.as_str())
                .add_string_choice("Team B", TeamLabel::TeamB.as_str())
            ),
        guild_command("match-entry", "Enter the next player of the match in progress (first five are team A)")
            .add_option(name())
            .add_option(tag())
            .add_option(count("kills", "Kills", true))
            .add_option(count("deaths", "Deaths", true))
            .add_option(count("assists", "Assists", true))
            .add_option(CreateCommandOption::new(CommandOptionType::String, "champion", "The champion the player played"))
            .add_option(role)
            .add_option(count("gold", "Gold earned", false))
            .add_option(count("damage", "Damage dealt to champions", false))
            .add_option(count("duration", "Game length in minutes", false)),
        guild_command("match-cancel", "Discard the match entry in progress"),
        guild_command("match-image", "Register a match from a screenshot of the end-of-game scoreboard")
            .add_option(CreateCommandOption::new(CommandOptionType::Attachment, "image", "The scoreboard screenshot").required(true)),
        guild_command("register", "Link your Riot account to your Discord account")
            .add_option(name())
            .add_option(tag()),
        guild_command("add-account", "Add an account without an owner so it can appear in matches")
            .default_member_permissions(Permissions::MANAGE_GUILD)
            .add_option(name())
            .add_option(tag()),
        guild_command("profile", "Show a player's statistics in this server")
            .add_option(CreateCommandOption::new(CommandOptionType::User, "player", "Whose profile to show (default: yours)")),
        guild_command("ranking", "Show the server leaderboard")
            .add_option(criterion),
    ]
}

pub(crate) struct Handler {
    pub(crate) db_pool: SqlitePool,
    pub(crate) config: Config,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) pending: Arc<PendingConfirmations>,
    pub(crate) extractor: Arc<dyn MatchExtractor>,
    pub(crate) verifier: Arc<dyn IdentityVerifier>,
    pub(crate) workers: WorkerPool,
}

impl Handler {
    async fn handle_command(&self, ctx: &Context, interaction: &CommandInteraction) -> Result<(), Error> {
        match &*interaction.data.name {
            "match-start" => {
                let scope = guild(interaction)?;
                let winner = required_string(interaction, "winner")?.parse::<TeamLabel>()?;
                self.sessions.start(interaction.user.id, scope, winner)?;
                reply(ctx, interaction, format!("Match entry started, {winner} won. Use `/match-entry` for each of the {MATCH_SIZE} players, starting with the five players of Team A.")).await?;
            }
            "match-entry" => {
                guild(interaction)?;
                let entry = PlayerEntry {
                    account_name: required_string(interaction, "name")?.to_owned(),
                    account_tag: required_string(interaction, "tag")?.to_owned(),
                    // reassigned by slot
                    team: TeamLabel::TeamA,
                    kills: required_count(interaction, "kills")?,
                    deaths: required_count(interaction, "deaths")?,
                    assists: required_count(interaction, "assists")?,
                    gold: count_option(interaction, "gold")?,
                    damage: count_option(interaction, "damage")?,
                    duration_seconds: count_option(interaction, "duration")?.map(|minutes| minutes.saturating_mul(60)),
                    champion_name: string_option(interaction, "champion")?.map(str::to_owned),
                    role_name: string_option(interaction, "role")?.map(str::to_owned),
                };
                let riot_id = entry.riot_id();
                let progress = self.sessions.submit_entry(interaction.user.id, entry)?;
                if progress.is_ready() {
                    let ticket = queue_wizard_match(&self.sessions, &self.pending, interaction.user.id)?;
                    interaction.create_response(ctx, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()
                        .ephemeral(false)
                    )).await?;
                    self.dispatch_confirmation(ctx, interaction.clone(), ticket);
                } else {
                    reply(ctx, interaction, format!(
                        "{riot_id} recorded for {} ({}/{MATCH_SIZE}). Next up: a player of {}.",
                        progress.team, progress.next_index, TeamLabel::for_slot(progress.next_index),
                    )).await?;
                }
            }
            "match-cancel" => {
                let collected = self.sessions.progress(interaction.user.id);
                let content = match collected {
                    Some(collected) if self.sessions.cancel(interaction.user.id) => format!("Match entry cancelled, {collected} of {MATCH_SIZE} players had been entered."),
                    _ => format!("You have no match entry in progress."),
                };
                reply(ctx, interaction, content).await?;
            }
            "match-image" => {
                let scope = guild(interaction)?;
                let Some(&CommandDataOptionValue::Attachment(attachment_id)) = option(interaction, "image") else { return Err(Error::Option("image")) };
                let attachment = interaction.data.resolved.attachments.get(&attachment_id).ok_or(Error::Option("image"))?;
                if !attachment.content_type.as_deref().is_some_and(|content_type| content_type.starts_with("image/")) {
                    return Err(Error::NotAnImage)
                }
                interaction.create_response(ctx, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()
                    .ephemeral(true)
                )).await?;
                let image = attachment.download().await?;
                let hints = account::names_in_scope(&self.db_pool, scope).await?;
                self.dispatch_extraction(ctx, interaction.clone(), scope, image, hints);
            }
            "register" => {
                let scope = guild(interaction)?;
                let name = required_string(interaction, "name")?;
                let tag = required_string(interaction, "tag")?;
                interaction.create_response(ctx, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()
                    .ephemeral(true)
                )).await?;
                let account = identity::register_account(&self.db_pool, &*self.verifier, interaction.user.id, name, tag, scope).await?;
                interaction.edit_response(ctx, EditInteractionResponse::new()
                    .content(MessageBuilder::default().push_safe(account.riot_id()).push(" is now linked to your Discord account.").build())
                ).await?;
            }
            "add-account" => {
                let scope = guild(interaction)?;
                let name = required_string(interaction, "name")?;
                let tag = required_string(interaction, "tag")?;
                let mut transaction = self.db_pool.begin().await?;
                let existing = account::find(&mut transaction, name, tag, scope).await?;
                let account = account::resolve(&mut transaction, name, tag, scope).await?;
                transaction.commit().await?;
                let mut content = MessageBuilder::default();
                content.push_safe(account.riot_id());
                if existing.is_some() {
                    content.push(" was already registered in this server.");
                } else {
                    content.push(" added. Its matches are recorded, but count towards statistics only once its owner uses `/register`.");
                }
                reply(ctx, interaction, content.build()).await?;
            }
            "profile" => {
                let scope = guild(interaction)?;
                let player = match option(interaction, "player") {
                    Some(&CommandDataOptionValue::User(player)) => player,
                    Some(_) => return Err(Error::Option("player")),
                    None => interaction.user.id,
                };
                let content = self.profile(scope, player).await?;
                reply(ctx, interaction, content).await?;
            }
            "ranking" => {
                let scope = guild(interaction)?;
                let criterion = match string_option(interaction, "criterion")? {
                    Some(name) => name.parse::<RankingCriterion>().map_err(|()| Error::Option("criterion"))?,
                    None => RankingCriterion::WinRate,
                };
                let (content, components) = self.ranking_view(scope, criterion, 1).await?;
                interaction.create_response(ctx, CreateInteractionResponse::Message(CreateInteractionResponseMessage::new()
                    .allowed_mentions(CreateAllowedMentions::new())
                    .content(content)
                    .components(components)
                )).await?;
            }
            name => return Err(Error::Unknown(name.to_owned())),
        }
        Ok(())
    }

    async fn handle_component(&self, ctx: &Context, interaction: &ComponentInteraction) -> Result<(), Error> {
        if let Some((decision, ticket)) = Ticket::parse(&interaction.data.custom_id) {
            return self.handle_decision(ctx, interaction, decision, ticket).await
        }
        match &*interaction.data.custom_id {
            custom_id if NavToken::is_nav(custom_id) => {
                let (criterion, scope, page) = custom_id.parse::<NavToken>()?.view_in(interaction.guild_id)?;
                let (content, components) = self.ranking_view(scope, criterion, page).await?;
                interaction.create_response(ctx, CreateInteractionResponse::UpdateMessage(CreateInteractionResponseMessage::new()
                    .allowed_mentions(CreateAllowedMentions::new())
                    .content(content)
                    .components(components)
                )).await?;
            }
            custom_id => return Err(Error::Unknown(custom_id.to_owned())),
        }
        Ok(())
    }

    /// Confirm and Discard buttons. Only the owner of the submission may press them.
    async fn handle_decision(&self, ctx: &Context, interaction: &ComponentInteraction, decision: Decision, ticket: Ticket) -> Result<(), Error> {
        if interaction.user.id != ticket.user {
            let content = MessageBuilder::default()
                .push("Only ")
                .mention(&ticket.user)
                .push(" can confirm or discard this match.")
                .build();
            reply(ctx, interaction, content).await?;
            return Ok(())
        }
        match decision {
            Decision::Confirm => {
                interaction.create_response(ctx, CreateInteractionResponse::Acknowledge).await?;
                self.dispatch_confirmation(ctx, interaction.clone(), ticket);
            }
            Decision::Discard => {
                let content = if self.pending.discard(ticket) {
                    "Match discarded."
                } else {
                    "This match is no longer waiting for confirmation."
                };
                interaction.create_response(ctx, CreateInteractionResponse::UpdateMessage(CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(Vec::default())
                )).await?;
            }
        }
        Ok(())
    }

    /// Registers the user's pending submission in the background and reports the outcome by
    /// editing the (already acknowledged) interaction response.
    fn dispatch_confirmation(&self, ctx: &Context, interaction: impl GenericInteraction + Send + 'static, ticket: Ticket) {
        let db_pool = self.db_pool.clone();
        let pending = Arc::clone(&self.pending);
        let user = ticket.user;
        let ctx = ctx.clone();
        self.workers.dispatch(
            async move {
                pending.confirm(ticket, |submission| async move {
                    register::register_match(&db_pool, &submission, Some(user)).await
                }).await
            },
            move |result| async move {
                let edit = match result {
                    Ok(entry) => {
                        log::info!("{user} confirmed match #{} in {}", entry.id, entry.scope);
                        EditInteractionResponse::new()
                            .allowed_mentions(CreateAllowedMentions::new())
                            .content(ledger_summary(&entry))
                            .components(Vec::default())
                    }
                    Err(ConfirmError::NothingPending) => EditInteractionResponse::new()
                        .content("This match is no longer waiting for confirmation.")
                        .components(Vec::default()),
                    Err(ConfirmError::Failed(e)) => {
                        let e = Error::from(e);
                        if e.is_internal() {
                            log::error!("failed to register match for {user}: {e} ({e:?})");
                        } else {
                            log::info!("match of {user} not registered: {e}");
                        }
                        EditInteractionResponse::new()
                            .content(format!("{}\nThe match was kept, press Confirm to try again once this is fixed.", e.user_message()))
                            .components(vec![confirmation_buttons(ticket)])
                    }
                };
                if let Err(e) = interaction.edit_response(&ctx, edit).await {
                    log::error!("failed to report match registration to {user}: {e}");
                }
            },
        );
    }

    fn dispatch_extraction(&self, ctx: &Context, interaction: CommandInteraction, scope: GuildId, image: Vec<u8>, hints: Vec<String>) {
        let extractor = Arc::clone(&self.extractor);
        let pending = Arc::clone(&self.pending);
        let ctx = ctx.clone();
        self.workers.dispatch(
            async move { extractor.extract(image, scope, hints).await },
            move |result: Result<MatchSubmission, extract::Error>| async move {
                let user = interaction.user.id;
                let edit = match result {
                    Ok(submission) => {
                        let content = MessageBuilder::default()
                            .push_line("Please check the match read from your screenshot:")
                            .push_safe(submission.summary())
                            .build();
                        let ticket = pending.insert(user, submission);
                        EditInteractionResponse::new()
                            .content(content)
                            .components(vec![confirmation_buttons(ticket)])
                    }
                    Err(e) => {
                        let e = Error::from(e);
                        log::warn!("extraction for {user} failed: {e}");
                        EditInteractionResponse::new().content(e.user_message())
                    }
                };
                if let Err(e) = interaction.edit_response(&ctx, edit).await {
                    log::error!("failed to report match extraction to {user}: {e}");
                }
            },
        );
    }

    async fn ranking_view(&self, scope: GuildId, criterion: RankingCriterion, page_number: usize) -> Result<(String, Vec<CreateActionRow>), Error> {
        let ranked = ranking::get_ranking(&self.db_pool, scope, self.config.ranking.min_games, criterion).await?;
        let page = Page::of(&ranked, page_number, self.config.ranking.page_size);
        let mut content = MessageBuilder::default();
        content.push_bold_line(format!("Leaderboard by {criterion}"));
        if page.items.is_empty() {
            content.push_line(if page.total_pages == 0 { "Nobody has played enough matches yet." } else { "There is nobody on this page." });
        }
        for (idx, entity) in page.items.iter().enumerate() {
            content
                .push(format!("{}. ", page.offset + idx + 1))
                .mention(&entity.user)
                .push_line(format!(" {}: {} ({} games)", criterion.label(), criterion.format(&entity.metrics), entity.metrics.games));
        }
        content.push_italic(format!("Page {} of {}", page.number, page.total_pages.max(1)));
        let sort_buttons = all::<RankingCriterion>()
            .map(|option| CreateButton::new(SortToken { criterion: option, scope }.encode())
                .label(option.label())
                .style(if option == criterion { ButtonStyle::Primary } else { ButtonStyle::Secondary })
                .disabled(option == criterion))
            .collect_vec();
        let mut components = sort_buttons.chunks(SORT_BUTTONS_PER_ROW).map(|row| CreateActionRow::Buttons(row.to_vec())).collect_vec();
        components.push(CreateActionRow::Buttons(vec![
            CreateButton::new(PageToken { criterion, scope, current_page: page.number, action: PageAction::Prev }.encode())
                .label("Previous")
                .style(ButtonStyle::Secondary)
                .disabled(!page.has_prev()),
            CreateButton::new(PageToken { criterion, scope, current_page: page.number, action: PageAction::Next }.encode())
                .label("Next")
                .style(ButtonStyle::Secondary)
                .disabled(!page.has_next()),
        ]));
        Ok((content.build(), components))
    }

    async fn profile(&self, scope: GuildId, player: UserId) -> Result<String, Error> {
        let mut content = MessageBuilder::default();
        let Some(totals) = stats::overall_for_user(&self.db_pool, scope, player).await? else {
            content.mention(&player).push(" has no recorded matches in this server.");
            return Ok(content.build())
        };
        let metrics = totals.metrics();
        content.push("Profile of ").mention(&player).push_line("");
        let accounts = account::owned_by(&self.db_pool, scope, player).await?;
        if !accounts.is_empty() {
            content.push("Accounts: ").push_line_safe(accounts.iter().map(|account| account.riot_id()).join(", "));
        }
        content.push_line(format!(
            "{} games, {} wins ({}), KDA {:.2}, kill participation {}, {:.0} gold/min, {:.0} damage/min",
            metrics.games, totals.total_wins, percent(metrics.win_rate), metrics.kda, percent(metrics.kill_participation), metrics.gold_per_minute, metrics.damage_per_minute,
        ));
        for (heading, rows) in [
            ("Most played champions", stats::champions_for_user(&self.db_pool, scope, player).await?),
            ("Roles", stats::roles_for_user(&self.db_pool, scope, player).await?),
        ] {
            if rows.is_empty() { continue }
            content.push_bold_line(heading);
            for row in rows.iter().take(PROFILE_ROWS) {
                let metrics = row.totals.metrics();
                content.push("- ").push_safe(&row.key).push_line(format!(": {} games, {} win rate, KDA {:.2}", metrics.games, percent(metrics.win_rate), metrics.kda));
            }
        }
        let recent = register::recent_matches(&self.db_pool, scope, player, PROFILE_ROWS as u32).await?;
        if !recent.is_empty() {
            content.push_bold_line("Recent matches");
            for row in recent {
                content.push(format!("- #{} {} {}, {}/{}/{}", row.match_id, row.registered_at.format("%Y-%m-%d"), if row.win { "win" } else { "loss" }, row.kills, row.deaths, row.assists));
                if let Some(champion) = &row.champion {
                    content.push(" as ").push_safe(champion);
                }
                content.push_line("");
            }
        }
        Ok(content.build())
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        log::info!("connected to Discord as {}", ready.user.name);
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _: Option<bool>) {
        match guild.id.set_commands(&ctx.http, commands()).await {
            Ok(commands) => log::info!("registered {} commands in {}", commands.len(), guild.id),
            Err(e) => log::error!("failed to register commands in {}: {e}", guild.id),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(interaction) => if let Err(e) = self.handle_command(&ctx, &interaction).await {
                report(&ctx, &interaction, e).await;
            },
            Interaction::Component(interaction) => if let Err(e) = self.handle_component(&ctx, &interaction).await {
                report(&ctx, &interaction, e).await;
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::submission::tests::submission,
    };

    #[test]
    fn every_command_is_registered() {
        assert_eq!(commands().len(), 8);
    }

    #[test]
    fn validation_failures_name_every_account() {
        let e = Error::Register(register::Error::ValidationFailed { missing: vec![format!("a#1"), format!("b#2")] });
        assert!(!e.is_internal());
        let message = e.user_message();
        assert!(message.contains("a#1, b#2"));
    }

    #[test]
    fn leaderboards_from_other_servers_read_as_outdated() {
        let e = Error::Nav(nav::DecodeError::OtherScope { token: GuildId::new(500), guild: Some(GuildId::new(501)) });
        assert!(!e.is_internal());
        assert_eq!(e.user_message(), "This leaderboard is outdated. Please run `/ranking` again.");
    }

    #[test]
    fn ownership_conflicts_name_the_owner() {
        let e = Error::Account(account::Error::OwnershipConflict { name: format!("Caps"), tag: format!("EUW"), owner: UserId::new(1) });
        assert!(e.user_message().starts_with("Caps#EUW is already linked to <@1>."));
    }

    #[test]
    fn confirmation_buttons_belong_to_their_ticket() {
        let pending = PendingConfirmations::default();
        let ticket = pending.insert(UserId::new(7), submission(GuildId::new(500), TeamLabel::TeamA));
        let CreateActionRow::Buttons(buttons) = confirmation_buttons(ticket) else { panic!("expected a button row") };
        assert_eq!(buttons.len(), 2);
        assert_eq!(Ticket::parse(&ticket.custom_id(Decision::Confirm)), Some((Decision::Confirm, ticket)));
        assert_eq!(ticket.user, UserId::new(7));
    }

    #[test]
    fn completed_wizard_sessions_wait_in_the_pending_map() {
        let (sessions, pending) = (SessionStore::default(), PendingConfirmations::default());
        let user = UserId::new(7);
        sessions.start(user, GuildId::new(500), TeamLabel::TeamA).unwrap();
        for entry in submission(GuildId::new(500), TeamLabel::TeamA).entries.into_iter().take(MATCH_SIZE - 1) {
            sessions.submit_entry(user, entry).unwrap();
        }
        assert!(matches!(queue_wizard_match(&sessions, &pending, user), Err(wizard::Error::Incomplete { collected: 9 })));
        sessions.submit_entry(user, submission(GuildId::new(500), TeamLabel::TeamA).entries[9].clone()).unwrap();
        let ticket = queue_wizard_match(&sessions, &pending, user).unwrap();
        assert_eq!(sessions.progress(user), None);
        assert!(pending.discard(ticket));
    }

    #[test]
    fn internal_errors_are_not_shown_verbatim() {
        let e = Error::Sql(sqlx::Error::RowNotFound);
        assert!(e.is_internal());
        assert_eq!(e.user_message(), "Sorry, something went wrong. Please try again later.");
        let e = Error::Wizard(wizard::Error::Incomplete { collected: 3 });
        assert_eq!(e.user_message(), "only 3 of 10 players have been entered");
    }
}
