// Executes validated actions against a sandbox desktop.
use std::time::Duration;

use crate::agent_engine::state::DesktopAction;
use crate::errors::DeskBenchResult;
use crate::executor::text_input::fold_diacritics;
use crate::perception::types::ScreenPoint;
use crate::sandbox::{Desktop, DesktopCommand, MouseButton, ScrollDirection};

/// Pause between the keystrokes of `find_on_page_ctrl_f`.
const FIND_PAUSE: Duration = Duration::from_millis(300);
/// Grace period after opening a URL so the page can start loading.
const OPEN_URL_PAUSE: Duration = Duration::from_secs(2);

pub async fn mouse_click(desktop: &dyn Desktop, at: ScreenPoint, button: MouseButton) -> DeskBenchResult<()> {
    move_mouse(desktop, at).await?;
    desktop.perform(&DesktopCommand::Click { button }).await
}

pub async fn mouse_double_click(desktop: &dyn Desktop, at: ScreenPoint) -> DeskBenchResult<()> {
    move_mouse(desktop, at).await?;
    desktop.perform(&DesktopCommand::DoubleClick).await
}

pub async fn move_mouse(desktop: &dyn Desktop, to: ScreenPoint) -> DeskBenchResult<()> {
    desktop.perform(&DesktopCommand::MoveMouse { x: to.x, y: to.y }).await
}

pub async fn type_text(desktop: &dyn Desktop, text: &str, delay_ms: u64) -> DeskBenchResult<String> {
    let clean = fold_diacritics(text);
    desktop
        .perform(&DesktopCommand::Write {
            text: clean.clone(),
            delay_ms,
        })
        .await?;
    Ok(clean)
}

pub async fn press_keys(desktop: &dyn Desktop, keys: &[&str]) -> DeskBenchResult<()> {
    desktop
        .perform(&DesktopCommand::Press {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
        .await
}

/// Runs one action and returns the confirmation shown to the model.
pub async fn execute(desktop: &dyn Desktop, action: &DesktopAction, type_delay_ms: u64) -> DeskBenchResult<String> {
    match action {
        DesktopAction::Click { at, button } => {
            mouse_click(desktop, *at, *button).await?;
            let verb = match button {
                MouseButton::Left => "Clicked",
                MouseButton::Right => "Right-clicked",
            };
            Ok(format!("{verb} at coordinates ({}, {})", at.x, at.y))
        }
        DesktopAction::DoubleClick { at } => {
            mouse_double_click(desktop, *at).await?;
            Ok(format!("Double-clicked at coordinates ({}, {})", at.x, at.y))
        }
        DesktopAction::MoveMouse { to } => {
            move_mouse(desktop, *to).await?;
            Ok(format!("Moved mouse to coordinates ({}, {})", to.x, to.y))
        }
        DesktopAction::TypeText { text } => {
            let typed = type_text(desktop, text, type_delay_ms).await?;
            Ok(format!("Typed text: '{typed}'"))
        }
        DesktopAction::PressKey { keys } => {
            desktop.perform(&DesktopCommand::Press { keys: keys.clone() }).await?;
            Ok(format!("Pressed key: {}", keys.join("+")))
        }
        DesktopAction::Scroll { at, direction, amount } => {
            move_mouse(desktop, *at).await?;
            desktop
                .perform(&DesktopCommand::Scroll {
                    direction: *direction,
                    amount: *amount,
                })
                .await?;
            let dir = match direction {
                ScrollDirection::Up => "up",
                ScrollDirection::Down => "down",
            };
            Ok(format!("Scrolled {dir} by {amount}"))
        }
        DesktopAction::Wait { seconds } => {
            tokio::time::sleep(Duration::from_secs_f64(*seconds)).await;
            Ok(format!("Waited for {seconds} seconds"))
        }
        DesktopAction::OpenUrl { url } => {
            desktop.perform(&DesktopCommand::Open { url: url.clone() }).await?;
            tokio::time::sleep(OPEN_URL_PAUSE).await;
            Ok(format!("Opened URL: {url}"))
        }
        DesktopAction::GoBack => {
            press_keys(desktop, &["alt", "left"]).await?;
            Ok("Went back one page".to_string())
        }
        DesktopAction::DragAndDrop { from, to } => {
            desktop.perform(&DesktopCommand::Drag { from: *from, to: *to }).await?;
            Ok(format!(
                "Dragged and dropped from [{}, {}] to [{}, {}]",
                from.x, from.y, to.x, to.y
            ))
        }
        DesktopAction::FindOnPage { query } => {
            press_keys(desktop, &["ctrl", "f"]).await?;
            tokio::time::sleep(FIND_PAUSE).await;
            let typed = type_text(desktop, query, type_delay_ms).await?;
            tokio::time::sleep(FIND_PAUSE).await;
            press_keys(desktop, &["enter"]).await?;
            tokio::time::sleep(FIND_PAUSE).await;
            press_keys(desktop, &["esc"]).await?;
            Ok(format!("Scrolled to the first occurrence of '{typed}'"))
        }
    }
}
