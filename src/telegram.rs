use std::sync::Arc;

use teloxide::{
    dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler},
    prelude::*,
    types::MessageId,
    utils::command::BotCommands,
    Bot,
};
use tracing::{error, info, info_span, instrument, Instrument};

use crate::flow::{CallbackAction, Reply, SessionHandler, TargetChoice};

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "start translating.")]
    Start,
    #[command(description = "show this text.")]
    Help,
}

pub fn schema() -> UpdateHandler<color_eyre::Report> {
    let commands = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let texts = Update::filter_message()
        .filter_map(|msg: Message| translatable_text(msg.text()))
        .endpoint(handle_text);

    let callbacks = Update::filter_callback_query().endpoint(handle_callback);

    dptree::entry()
        .branch(commands)
        .branch(texts)
        .branch(callbacks)
}

/// Anything that looks like a command, known or not, is never translated.
fn translatable_text(text: Option<&str>) -> Option<String> {
    text.filter(|text| !text.starts_with('/')).map(str::to_owned)
}

#[instrument(skip_all, fields(chat_id = %msg.chat.id, ?cmd), err)]
async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    handler: Arc<SessionHandler>,
) -> color_eyre::Result<()> {
    let reply = match cmd {
        Command::Start => {
            let username = msg.from().and_then(|user| user.username.as_deref());
            info!(?username, "Received /start command");
            handler.start()
        }
        Command::Help => Reply::text(Command::descriptions().to_string()),
    };
    send(&bot, &msg, reply).await
}

#[instrument(skip_all, fields(chat_id = %msg.chat.id), err)]
async fn handle_text(
    bot: Bot,
    msg: Message,
    text: String,
    handler: Arc<SessionHandler>,
) -> color_eyre::Result<()> {
    info!("Processing message");
    let reply = handler.on_text(msg.chat.id, &text).await;
    send(&bot, &msg, reply).await
}

#[instrument(skip_all, fields(data = ?query.data), err)]
async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    handler: Arc<SessionHandler>,
) -> color_eyre::Result<()> {
    let action = query.data.as_deref().and_then(CallbackAction::parse);
    let (Some(action), Some(message)) = (action, query.message.as_ref()) else {
        info!("ignoring unknown or detached button press");
        bot.answer_callback_query(query.id).await?;
        return Ok(());
    };
    let (chat_id, message_id) = (message.chat.id, message.id);

    match action {
        CallbackAction::SelectTarget(id, target) => {
            let choice = handler.choose_target(chat_id, id, target).await;
            handle_choice(bot, query.id, chat_id, message_id, choice, handler).await?;
        }
        CallbackAction::Feedback(id, kind) => {
            bot.answer_callback_query(query.id).await?;
            let reply = handler.feedback(chat_id, id, kind).await;
            edit(&bot, chat_id, message_id, reply).await?;
        }
    }
    Ok(())
}

/// Acknowledges the press before the engine runs; the translation itself
/// runs on its own task and edits the prompt when done.
async fn handle_choice(
    bot: Bot,
    query_id: String,
    chat_id: ChatId,
    message_id: MessageId,
    choice: TargetChoice,
    handler: Arc<SessionHandler>,
) -> color_eyre::Result<()> {
    match choice {
        TargetChoice::Translate(job) => {
            bot.answer_callback_query(query_id).await?;

            tokio::spawn(
                async move {
                    let reply = handler.translate(job).await;
                    if let Err(err) = edit(&bot, chat_id, message_id, reply).await {
                        error!(?err, "failed to deliver translation");
                    }
                }
                .instrument(info_span!("translation", %chat_id)),
            );
        }
        TargetChoice::Notice(notice) => {
            bot.answer_callback_query(query_id).text(notice).await?;
        }
        TargetChoice::Replace(reply) => {
            bot.answer_callback_query(query_id).await?;
            edit(&bot, chat_id, message_id, reply).await?;
        }
    }
    Ok(())
}

async fn send(bot: &Bot, msg: &Message, reply: Reply) -> color_eyre::Result<()> {
    let mut request = bot
        .send_message(msg.chat.id, reply.text)
        .reply_to_message_id(msg.id);
    if let Some(markup) = reply.markup {
        request = request.reply_markup(markup);
    }
    request.await?;
    Ok(())
}

async fn edit(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    reply: Reply,
) -> color_eyre::Result<()> {
    let mut request = bot.edit_message_text(chat_id, message_id, reply.text);
    if let Some(markup) = reply.markup {
        request = request.reply_markup(markup);
    }
    request.await?;
    Ok(())
}
