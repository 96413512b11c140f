//! Image attribution
//!
//! Images arrive attached to document blocks, not to fields. They are placed
//! once the whole block has been read, using the section the block ended in
//! (or the section it left when it moved from question body to answer).

use crate::models::{AssetReference, Question};

use super::state::{AssetSlot, ParserState, QuestionRef};

#[derive(Debug, Clone, Copy)]
enum Target {
    Current,
    Closed(QuestionRef),
}

fn slot_mut(question: &mut Question, slot: AssetSlot) -> &mut Option<String> {
    match slot {
        AssetSlot::Handout => &mut question.handout_asset_file_name,
        AssetSlot::Comment => &mut question.comment_asset_file_name,
    }
}

/// Put `asset` into a question slot; an occupied slot keeps its asset
fn attach(state: &mut ParserState, target: Target, slot: AssetSlot, asset: &AssetReference) {
    let question = match target {
        Target::Current => state.current_question.as_mut(),
        Target::Closed(location) => state.question_at(location),
    };
    let Some(question) = question else {
        state.pending_assets.push(asset.clone());
        return;
    };

    let number = question.number.clone();
    let field = slot_mut(question, slot);
    let outcome = match field.clone() {
        Some(existing) => Err(existing),
        None => {
            *field = Some(asset.file_name.clone());
            Ok(())
        }
    };

    state.scope.associated.insert(asset.file_name.clone());
    match outcome {
        Ok(()) => {
            if !state.attached_assets.iter().any(|a| a.file_name == asset.file_name) {
                state.attached_assets.push(asset.clone());
            }
        }
        Err(existing) => state.warn(format!(
            "Question {}: {} already has image {}, dropped {}",
            number,
            slot.label(),
            existing,
            asset.file_name
        )),
    }
}

/// Place the images of the block that was just processed
pub fn attribute_block_assets(state: &mut ParserState, assets: &[AssetReference]) {
    let mut fresh: Vec<AssetReference> = Vec::with_capacity(assets.len());
    for asset in assets {
        let repeated = fresh.iter().any(|a| a.file_name == asset.file_name);
        if !repeated && !state.scope.associated.contains(&asset.file_name) {
            fresh.push(asset.clone());
        }
    }
    if fresh.is_empty() {
        return;
    }

    if state.current_question.is_none() {
        for asset in fresh {
            if !state.pending_assets.iter().any(|a| a.file_name == asset.file_name) {
                state.pending_assets.push(asset);
            }
        }
        return;
    }

    let mut rest = fresh.as_slice();

    // two questions in one block: without a handout marker for the new one,
    // the first image illustrates the previous answer
    if let Some(previous) = state.scope.previous_question {
        if !state.scope.handout_seen {
            if let Some((first, tail)) = rest.split_first() {
                attach(state, Target::Closed(previous), AssetSlot::Comment, first);
                rest = tail;
            }
        }
    }

    let section = state.scope.pre_transition.unwrap_or(state.section);
    let slot = AssetSlot::for_section(section);
    for asset in rest {
        attach(state, Target::Current, slot, asset);
    }
}

/// Attach images queued before any question existed to the new question
pub fn flush_pending(state: &mut ParserState) {
    if state.current_question.is_none() || state.pending_assets.is_empty() {
        return;
    }
    let pending = std::mem::take(&mut state.pending_assets);
    for asset in &pending {
        attach(state, Target::Current, AssetSlot::Handout, asset);
    }
}
