use std::{cmp, io, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use prestaserv_core::{
    service_types, ApiClient, ApiError, ApiResult, AuthService, Contract, ContractService,
    ContractStatus, LinkFilter, NewContract, ProviderServiceLink, Rating, ServiceCatalog, Session,
    SessionEvent, User,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::{
    spawn,
    sync::{broadcast, mpsc},
};
use tracing::{debug, error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_FIELD_LEN: usize = 128;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Login,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Contracts,
    Links,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginField {
    Email,
    Senha,
}

#[derive(Debug, Default)]
struct LoginForm {
    email: String,
    senha: String,
    focus: Option<LoginField>,
}

impl LoginForm {
    fn focused(&self) -> LoginField {
        self.focus.unwrap_or(LoginField::Email)
    }

    fn toggle_focus(&mut self) {
        self.focus = Some(match self.focused() {
            LoginField::Email => LoginField::Senha,
            LoginField::Senha => LoginField::Email,
        });
    }

    fn field_mut(&mut self) -> &mut String {
        match self.focused() {
            LoginField::Email => &mut self.email,
            LoginField::Senha => &mut self.senha,
        }
    }

    fn insert(&mut self, ch: char) {
        let field = self.field_mut();
        if field.chars().count() >= MAX_FIELD_LEN || ch.is_control() {
            return;
        }
        field.push(ch);
    }

    fn backspace(&mut self) {
        self.field_mut().pop();
    }

    fn clear_password(&mut self) {
        self.senha.clear();
    }

    fn masked_password(&self) -> String {
        "•".repeat(self.senha.chars().count())
    }
}

/// Three scores typed as digits, deadline then quality then price.
#[derive(Debug)]
struct RatingPrompt {
    contract_id: i64,
    digits: Vec<u8>,
}

impl RatingPrompt {
    fn new(contract_id: i64) -> Self {
        Self {
            contract_id,
            digits: Vec::with_capacity(3),
        }
    }

    fn push(&mut self, ch: char) {
        if self.digits.len() >= 3 {
            return;
        }
        if let Some(score) = ch.to_digit(10) {
            if (1..=5).contains(&score) {
                self.digits.push(score as u8);
            }
        }
    }

    fn backspace(&mut self) {
        self.digits.pop();
    }

    fn rating(&self) -> Option<Rating> {
        match self.digits.as_slice() {
            [prazo, qualidade, preco] => Some(Rating::new(*prazo, *qualidade, *preco)),
            _ => None,
        }
    }
}

struct DashboardData {
    contracts: Vec<Contract>,
    links: Vec<ProviderServiceLink>,
}

#[derive(Debug)]
struct DashboardState {
    contracts: Vec<Contract>,
    links: Vec<ProviderServiceLink>,
    types: Vec<String>,
    type_filter: Option<usize>,
    panel: Panel,
    contract_cursor: usize,
    link_cursor: usize,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            contracts: Vec::new(),
            links: Vec::new(),
            types: Vec::new(),
            type_filter: None,
            panel: Panel::Contracts,
            contract_cursor: 0,
            link_cursor: 0,
        }
    }
}

impl DashboardState {
    fn set_data(&mut self, data: DashboardData) {
        let previous_type = self.active_type().map(str::to_string);
        self.types = service_types(&data.links);
        self.type_filter =
            previous_type.and_then(|wanted| self.types.iter().position(|tipo| *tipo == wanted));
        self.contracts = data.contracts;
        self.links = data.links;
        self.clamp();
    }

    fn active_type(&self) -> Option<&str> {
        self.type_filter
            .and_then(|index| self.types.get(index))
            .map(String::as_str)
    }

    fn link_filter(&self) -> LinkFilter {
        match self.active_type() {
            Some(tipo) => LinkFilter::by_type(tipo),
            None => LinkFilter::default(),
        }
    }

    fn visible_links(&self) -> Vec<&ProviderServiceLink> {
        let filter = self.link_filter();
        self.links.iter().filter(|link| filter.matches(link)).collect()
    }

    /// None, then each known type, then back to none.
    fn cycle_type(&mut self) {
        self.type_filter = match self.type_filter {
            None if !self.types.is_empty() => Some(0),
            Some(index) if index + 1 < self.types.len() => Some(index + 1),
            _ => None,
        };
        self.link_cursor = 0;
    }

    fn toggle_panel(&mut self) {
        self.panel = match self.panel {
            Panel::Contracts => Panel::Links,
            Panel::Links => Panel::Contracts,
        };
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.panel {
            Panel::Contracts => {
                self.contract_cursor = step(self.contract_cursor, delta, self.contracts.len())
            }
            Panel::Links => {
                let len = self.visible_links().len();
                self.link_cursor = step(self.link_cursor, delta, len);
            }
        }
    }

    fn selected_contract(&self) -> Option<&Contract> {
        self.contracts.get(self.contract_cursor)
    }

    fn selected_link(&self) -> Option<&ProviderServiceLink> {
        self.visible_links().get(self.link_cursor).copied()
    }

    fn replace_contract(&mut self, contract: Contract) {
        match self.contracts.iter_mut().find(|known| known.id == contract.id) {
            Some(slot) => *slot = contract,
            None => self.contracts.push(contract),
        }
    }

    fn clamp(&mut self) {
        self.contract_cursor = step(self.contract_cursor, 0, self.contracts.len());
        self.link_cursor = step(self.link_cursor, 0, self.visible_links().len());
    }
}

fn step(cursor: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = cursor as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}

enum AppEvent {
    Input(Event),
    Tick,
    LoggedIn(ApiResult<Session>),
    Loaded(ApiResult<DashboardData>),
    ContractChanged {
        action: &'static str,
        result: ApiResult<Contract>,
    },
    SessionInvalidated,
}

/// Terminal front-end for the marketplace.
pub struct PrestaservApp {
    client: ApiClient,
    auth: AuthService,
    catalog: ServiceCatalog,
    contracts: Arc<ContractService>,
    theme: Theme,
    screen: Screen,
    session: Option<Session>,
    login: LoginForm,
    dashboard: DashboardState,
    rating_prompt: Option<RatingPrompt>,
    status: String,
    pending: bool,
    should_quit: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
}

impl PrestaservApp {
    pub fn new(client: ApiClient) -> Self {
        Self {
            auth: AuthService::new(client.clone()),
            catalog: ServiceCatalog::new(client.clone()),
            contracts: Arc::new(ContractService::new(client.clone())),
            client,
            theme: Theme::default(),
            screen: Screen::Login,
            session: None,
            login: LoginForm::default(),
            dashboard: DashboardState::default(),
            rating_prompt: None,
            status: "Sign in to continue".to_string(),
            pending: false,
            should_quit: false,
            event_tx: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        spawn_session_watch(self.client.subscribe(), event_tx.clone());
        self.event_tx = Some(event_tx);

        if let Some(session) = self.auth.current() {
            info!(user_id = session.user.id, "restored stored session");
            self.enter_dashboard(session);
        }

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }
            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) || self.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => true,
            Some(AppEvent::LoggedIn(result)) => {
                self.pending = false;
                self.login.clear_password();
                match result {
                    Ok(session) => self.enter_dashboard(session),
                    Err(err) => {
                        warn!(error = %err, "login failed");
                        self.set_status(describe(&err));
                    }
                }
                true
            }
            Some(AppEvent::Loaded(result)) => {
                self.pending = false;
                match result {
                    Ok(data) => {
                        let message = format!(
                            "{} contracts, {} offers",
                            data.contracts.len(),
                            data.links.len()
                        );
                        self.dashboard.set_data(data);
                        self.set_status(message);
                    }
                    Err(err) => {
                        error!(error = %err, "dashboard refresh failed");
                        self.set_status(describe(&err));
                    }
                }
                true
            }
            Some(AppEvent::ContractChanged { action, result }) => {
                self.pending = false;
                match result {
                    Ok(contract) => {
                        self.set_status(format!("Contract #{} {action}", contract.id));
                        self.dashboard.replace_contract(contract);
                    }
                    Err(err) => self.set_status(describe(&err)),
                }
                true
            }
            Some(AppEvent::SessionInvalidated) => {
                if self.session.take().is_some() {
                    info!("session invalidated by the server");
                    self.leave_dashboard("Session expired, please sign in again");
                }
                true
            }
            None => false,
        }
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return Ok(());
        }
        if self.rating_prompt.is_some() {
            self.handle_rating_key(key);
            return Ok(());
        }
        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Dashboard => self.handle_dashboard_key(key)?,
        }
        Ok(())
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.login.toggle_focus()
            }
            KeyCode::Backspace => self.login.backspace(),
            KeyCode::Enter => match self.login.focused() {
                LoginField::Email => self.login.toggle_focus(),
                LoginField::Senha => self.submit_login(),
            },
            KeyCode::Char(ch) => self.login.insert(ch),
            _ => {}
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.dashboard.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.dashboard.move_cursor(-1),
            KeyCode::Tab => self.dashboard.toggle_panel(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('t') => {
                self.dashboard.cycle_type();
                let label = self.dashboard.active_type().unwrap_or("all types").to_string();
                self.set_status(format!("Showing {label}"));
            }
            KeyCode::Char('c') => self.close_selected(),
            KeyCode::Char('a') => self.begin_rating(),
            KeyCode::Char('h') => self.hire_selected(),
            KeyCode::Char('l') => {
                self.auth.logout()?;
                self.session = None;
                self.leave_dashboard("Signed out");
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_rating_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.rating_prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.rating_prompt = None;
                self.set_status("Rating cancelled".to_string());
            }
            KeyCode::Backspace => prompt.backspace(),
            KeyCode::Char(ch) => prompt.push(ch),
            KeyCode::Enter => match prompt.rating() {
                Some(rating) => {
                    let contract_id = prompt.contract_id;
                    self.rating_prompt = None;
                    self.submit_rating(contract_id, rating);
                }
                None => self.set_status("Type three scores from 1 to 5".to_string()),
            },
            _ => {}
        }
    }

    fn enter_dashboard(&mut self, session: Session) {
        info!(user_id = session.user.id, role = %session.user.tipo, "entering dashboard");
        self.set_status(format!("Welcome, {}", session.user.nome));
        self.session = Some(session);
        self.dashboard = DashboardState::default();
        self.screen = Screen::Dashboard;
        self.refresh();
    }

    fn leave_dashboard(&mut self, message: &str) {
        self.contracts.forget_all();
        self.dashboard = DashboardState::default();
        self.rating_prompt = None;
        self.login = LoginForm::default();
        self.screen = Screen::Login;
        self.set_status(message.to_string());
    }

    fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|session| &session.user)
    }

    fn sender(&mut self) -> Option<mpsc::Sender<AppEvent>> {
        if self.pending {
            self.set_status("Still waiting for the server…".to_string());
            return None;
        }
        let sender = self.event_tx.clone();
        if sender.is_none() {
            self.set_status("Internal error: event channel unavailable".to_string());
            error!("event_channel_missing");
        }
        sender
    }

    fn submit_login(&mut self) {
        let Some(sender) = self.sender() else {
            return;
        };
        let email = self.login.email.clone();
        let senha = self.login.senha.clone();
        let auth = self.auth.clone();
        self.pending = true;
        self.set_status("Signing in…".to_string());
        spawn(async move {
            let result = auth.login(&email, &senha).await;
            let _ = sender.send(AppEvent::LoggedIn(result)).await;
        });
    }

    fn refresh(&mut self) {
        let Some(user) = self.current_user().cloned() else {
            return;
        };
        let Some(sender) = self.sender() else {
            return;
        };
        debug!(user_id = user.id, "refreshing dashboard");
        let contracts = Arc::clone(&self.contracts);
        let catalog = self.catalog.clone();
        self.pending = true;
        self.set_status("Loading…".to_string());
        spawn(async move {
            let result = load_dashboard(&contracts, &catalog, &user).await;
            let _ = sender.send(AppEvent::Loaded(result)).await;
        });
    }

    fn close_selected(&mut self) {
        if !self.current_user().is_some_and(User::is_provider) {
            self.set_status("Only providers close contracts".to_string());
            return;
        }
        let Some(contract) = self.dashboard.selected_contract() else {
            self.set_status("No contract selected".to_string());
            return;
        };
        let contract_id = contract.id;
        let Some(sender) = self.sender() else {
            return;
        };
        let contracts = Arc::clone(&self.contracts);
        self.pending = true;
        self.set_status(format!("Closing contract #{contract_id}…"));
        spawn(async move {
            let result = contracts.close(contract_id).await;
            let _ = sender
                .send(AppEvent::ContractChanged {
                    action: "closed",
                    result,
                })
                .await;
        });
    }

    fn begin_rating(&mut self) {
        if self.current_user().map_or(true, User::is_provider) {
            self.set_status("Only clients rate contracts".to_string());
            return;
        }
        let Some(contract) = self.dashboard.selected_contract() else {
            self.set_status("No contract selected".to_string());
            return;
        };
        match contract.status() {
            ContractStatus::Closed => {
                self.rating_prompt = Some(RatingPrompt::new(contract.id));
                self.set_status("Scores for deadline, quality and price".to_string());
            }
            ContractStatus::Open => {
                self.set_status("The provider has not closed this contract yet".to_string())
            }
            ContractStatus::Rated => self.set_status("Contract already rated".to_string()),
        }
    }

    fn submit_rating(&mut self, contract_id: i64, rating: Rating) {
        let Some(sender) = self.sender() else {
            return;
        };
        let contracts = Arc::clone(&self.contracts);
        self.pending = true;
        self.set_status(format!("Rating contract #{contract_id}…"));
        spawn(async move {
            let result = contracts.rate(contract_id, &rating).await;
            let _ = sender
                .send(AppEvent::ContractChanged {
                    action: "rated",
                    result,
                })
                .await;
        });
    }

    fn hire_selected(&mut self) {
        let Some(user) = self.current_user().cloned() else {
            return;
        };
        if user.is_provider() {
            self.set_status("Only clients hire services".to_string());
            return;
        }
        let Some(link) = self.dashboard.selected_link() else {
            self.set_status("No offer selected".to_string());
            return;
        };
        let input = NewContract {
            cliente_id: Some(user.id),
            fornecedor_id: Some(link.usuario.id),
            servico_id: Some(link.servico.id),
        };
        let provider = link.usuario.nome.clone();
        let Some(sender) = self.sender() else {
            return;
        };
        let contracts = Arc::clone(&self.contracts);
        self.pending = true;
        self.set_status(format!("Hiring {provider}…"));
        spawn(async move {
            let result = contracts.create(&input).await;
            let _ = sender
                .send(AppEvent::ContractChanged {
                    action: "created",
                    result,
                })
                .await;
        });
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn draw(&mut self, frame: &mut Frame) {
        match self.screen {
            Screen::Login => self.draw_login(frame),
            Screen::Dashboard => self.draw_dashboard(frame),
        }
        if let Some(prompt) = &self.rating_prompt {
            self.render_rating_prompt(frame, prompt);
        }
    }

    fn draw_login(&self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(8), Constraint::Length(3)])
            .split(area);
        let form_area = centered_rect(50.min(area.width), 8, chunks[0]);

        let focus = self.login.focused();
        let label = |field: LoginField, text: &'static str| {
            let style = if focus == field {
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.theme.muted)
            };
            Span::styled(text, style)
        };
        let lines = vec![
            Line::from(vec![
                label(LoginField::Email, "Email  "),
                Span::raw(self.login.email.clone()),
            ]),
            Line::from(""),
            Line::from(vec![
                label(LoginField::Senha, "Senha  "),
                Span::raw(self.login.masked_password()),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" switch  "),
                Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" sign in  "),
                Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" quit"),
            ]),
        ];
        let form = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("PrestaServ"))
            .wrap(Wrap { trim: false });
        frame.render_widget(form, form_area);

        let (row, text_len) = match focus {
            LoginField::Email => (0, self.login.email.chars().count()),
            LoginField::Senha => (2, self.login.senha.chars().count()),
        };
        let cursor_x = (form_area.x + 8 + text_len as u16)
            .min(form_area.x + form_area.width.saturating_sub(2));
        frame.set_cursor(cursor_x, form_area.y + 1 + row);

        self.render_status(frame, chunks[1]);
    }

    fn draw_dashboard(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(8),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(area);
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(chunks[0]);

        self.render_contracts(frame, body[0]);
        self.render_links(frame, body[1]);
        self.render_help(frame, chunks[1]);
        self.render_status(frame, chunks[2]);
    }

    fn panel_block(&self, title: String, panel: Panel) -> Block<'static> {
        let border = if self.dashboard.panel == panel {
            Style::default().fg(self.theme.accent)
        } else {
            Style::default().fg(self.theme.muted)
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(title)
    }

    fn render_contracts(&self, frame: &mut Frame, area: Rect) {
        let is_provider = self.current_user().is_some_and(User::is_provider);
        let mut list_state = ListState::default();
        if !self.dashboard.contracts.is_empty() {
            list_state.select(Some(self.dashboard.contract_cursor));
        }

        let items: Vec<ListItem> = if self.dashboard.contracts.is_empty() {
            vec![ListItem::new(Line::from("  No contracts yet"))]
        } else {
            self.dashboard
                .contracts
                .iter()
                .map(|contract| {
                    let status = contract.status();
                    let status_style = match status {
                        ContractStatus::Open => Style::default().fg(self.theme.warning),
                        ContractStatus::Closed => Style::default().fg(self.theme.accent),
                        ContractStatus::Rated => Style::default().fg(self.theme.success),
                    };
                    let counterpart = if is_provider {
                        &contract.cliente.nome
                    } else {
                        &contract.fornecedor.nome
                    };
                    let mut spans = vec![
                        Span::styled(format!("#{:<4} ", contract.id), Style::default().fg(self.theme.muted)),
                        Span::styled(format!("{:<7}", status.to_string()), status_style),
                        Span::styled(
                            contract.servico.descricao.clone(),
                            Style::default()
                                .fg(self.theme.primary_fg)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(format!(" · {counterpart}"), Style::default().fg(self.theme.muted)),
                    ];
                    if let Some(done) = contract.data_conclusao {
                        spans.push(Span::raw(format!("  ✓ {}", done.format("%d/%m/%Y"))));
                    }
                    if let (Some(prazo), Some(qualidade), Some(preco)) =
                        (contract.nota_prazo, contract.nota_qualidade, contract.nota_preco)
                    {
                        spans.push(Span::raw(format!("  ★ {prazo}/{qualidade}/{preco}")));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let title = if is_provider {
            "Contracts received"
        } else {
            "My contracts"
        };
        let list = List::new(items)
            .block(self.panel_block(title.to_string(), Panel::Contracts))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_links(&self, frame: &mut Frame, area: Rect) {
        let is_provider = self.current_user().is_some_and(User::is_provider);
        let links = self.dashboard.visible_links();
        let mut list_state = ListState::default();
        if !links.is_empty() {
            list_state.select(Some(self.dashboard.link_cursor.min(links.len() - 1)));
        }

        let items: Vec<ListItem> = if links.is_empty() {
            vec![ListItem::new(Line::from("  No offers"))]
        } else {
            links
                .iter()
                .map(|link| {
                    let mut spans = vec![
                        Span::styled(
                            link.effective_description().to_string(),
                            Style::default().fg(self.theme.primary_fg),
                        ),
                        Span::styled(
                            format!("  R$ {:.2}/h", link.effective_price()),
                            Style::default().fg(self.theme.success),
                        ),
                    ];
                    if !is_provider {
                        spans.push(Span::styled(
                            format!(" · {}", link.usuario.nome),
                            Style::default().fg(self.theme.muted),
                        ));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let title = if is_provider {
            "My services".to_string()
        } else {
            format!(
                "Offers [{}]",
                self.dashboard.active_type().unwrap_or("all types")
            )
        };
        let list = List::new(items)
            .block(self.panel_block(title, Panel::Links))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let is_provider = self.current_user().is_some_and(User::is_provider);
        let mut keys = vec![("Tab", "panel"), ("j/k", "move"), ("r", "refresh")];
        if is_provider {
            keys.push(("c", "close"));
        } else {
            keys.extend([("h", "hire"), ("a", "rate"), ("t", "type")]);
        }
        keys.extend([("l", "logout"), ("q", "quit")]);

        let mut spans = Vec::new();
        for (key, action) in keys {
            spans.push(Span::styled(
                key,
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(format!(" {action}  ")));
        }
        let help = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL).title("Keys"));
        frame.render_widget(help, area);
    }

    fn render_rating_prompt(&self, frame: &mut Frame, prompt: &RatingPrompt) {
        let frame_area = frame.size();
        let width = cmp::max(cmp::min(48_u16, frame_area.width.saturating_sub(4)), 24_u16);
        let area = centered_rect(width, 7, frame_area);
        frame.render_widget(Clear, area);

        let labels = ["Prazo", "Qualidade", "Preço"];
        let scores: Vec<Span> = labels
            .iter()
            .enumerate()
            .flat_map(|(index, label)| {
                let value = prompt
                    .digits
                    .get(index)
                    .map(|score| score.to_string())
                    .unwrap_or_else(|| "_".to_string());
                [
                    Span::raw(format!("{label} ")),
                    Span::styled(
                        format!("{value}  "),
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    ),
                ]
            })
            .collect();
        let helper = Line::from(vec![
            Span::styled("1-5", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" score  "),
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" submit  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]);

        let paragraph = Paragraph::new(vec![Line::from(scores), Line::from(""), helper])
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Rate contract #{}", prompt.contract_id)),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let who = match self.current_user() {
            Some(user) => format!("{} ({})", user.nome, user.tipo),
            None => "not signed in".to_string(),
        };
        let style = if self.pending {
            Style::default().fg(self.theme.warning)
        } else if self.status.starts_with("Error") {
            Style::default().fg(self.theme.danger)
        } else {
            Style::default().fg(self.theme.primary_fg)
        };
        let paragraph = Paragraph::new(Line::from(vec![
            Span::styled(self.status.clone(), style),
            Span::styled(format!("  · {who}"), Style::default().fg(self.theme.muted)),
        ]))
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

async fn load_dashboard(
    contracts: &ContractService,
    catalog: &ServiceCatalog,
    user: &User,
) -> ApiResult<DashboardData> {
    let filter = dashboard_filter(user);
    let (contracts, links) = if user.is_provider() {
        tokio::try_join!(
            contracts.list_for_provider(user.id),
            catalog.list_provider_links(&filter),
        )?
    } else {
        tokio::try_join!(
            contracts.list_for_client(user.id),
            catalog.list_provider_links(&filter),
        )?
    };
    Ok(DashboardData { contracts, links })
}

/// Providers see their own offers, clients see every offer.
fn dashboard_filter(user: &User) -> LinkFilter {
    if user.is_provider() {
        LinkFilter::by_provider(user.id)
    } else {
        LinkFilter::default()
    }
}

/// Status line text for a failed operation.
fn describe(err: &ApiError) -> String {
    match err {
        ApiError::Auth { .. } => format!("Error: {err} (signed out)"),
        other => format!("Error: {other}"),
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn spawn_session_watch(
    mut events: broadcast::Receiver<SessionEvent>,
    sender: mpsc::Sender<AppEvent>,
) {
    spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Invalidated) => {
                    if sender.send(AppEvent::SessionInvalidated).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(id: i64, tipo: &str) -> ProviderServiceLink {
        serde_json::from_value(json!({
            "id": id,
            "usuario": { "id": 2, "nome": "Bruno", "email": "b@example.com", "tipo": "fornecedor" },
            "servico": { "id": 5, "descricao": "Serviço", "tipoServico": tipo, "valorHora": 40 },
            "precoPersonalizado": null
        }))
        .expect("link")
    }

    #[test]
    fn rating_prompt_needs_three_valid_scores() {
        let mut prompt = RatingPrompt::new(7);
        for ch in ['5', '0', '9', 'x', '4'] {
            prompt.push(ch);
        }
        assert!(prompt.rating().is_none());
        prompt.push('3');
        prompt.push('1');
        assert_eq!(prompt.rating(), Some(Rating::new(5, 4, 3)));
        prompt.backspace();
        prompt.push('2');
        assert_eq!(prompt.rating(), Some(Rating::new(5, 4, 2)));
    }

    #[test]
    fn login_form_edits_the_focused_field() {
        let mut form = LoginForm::default();
        for ch in "c@x.io".chars() {
            form.insert(ch);
        }
        form.toggle_focus();
        for ch in "pw".chars() {
            form.insert(ch);
        }
        form.backspace();
        assert_eq!(form.email, "c@x.io");
        assert_eq!(form.senha, "p");
        assert_eq!(form.masked_password(), "•");
        form.clear_password();
        assert!(form.senha.is_empty());
    }

    #[test]
    fn type_filter_cycles_and_survives_refresh() {
        let mut dashboard = DashboardState::default();
        dashboard.set_data(DashboardData {
            contracts: Vec::new(),
            links: vec![link(1, "Pintura"), link(2, "Limpeza"), link(3, "Pintura")],
        });
        assert_eq!(dashboard.visible_links().len(), 3);

        dashboard.cycle_type();
        assert_eq!(dashboard.active_type(), Some("Pintura"));
        assert_eq!(dashboard.visible_links().len(), 2);

        dashboard.set_data(DashboardData {
            contracts: Vec::new(),
            links: vec![link(4, "Limpeza"), link(5, "Pintura")],
        });
        assert_eq!(dashboard.active_type(), Some("Pintura"));
        assert_eq!(dashboard.visible_links().len(), 1);

        dashboard.cycle_type();
        assert_eq!(dashboard.active_type(), None);
        assert_eq!(dashboard.visible_links().len(), 2);
    }

    #[test]
    fn dashboard_offers_depend_on_role() {
        let mut user = link(1, "Pintura").usuario;
        let provider_filter = dashboard_filter(&user);
        assert_eq!(provider_filter.usuario_id, Some(2));
        assert!(provider_filter.tipo_servico.is_none());

        user.tipo = prestaserv_core::UserRole::Cliente;
        let client_filter = dashboard_filter(&user);
        assert!(client_filter.usuario_id.is_none());
        assert!(client_filter.tipo_servico.is_none());
    }

    #[test]
    fn cursor_stays_in_bounds() {
        assert_eq!(step(0, -1, 3), 0);
        assert_eq!(step(2, 1, 3), 2);
        assert_eq!(step(1, 1, 3), 2);
        assert_eq!(step(5, 0, 0), 0);
    }
}
