//! Slider and button builders bound to the plugin parameters.

use crate::ui::state::WhooshData;
use crate::WhooshParams;
use nih_plug::params::Param;
use nih_plug_vizia::vizia::prelude::*;
use nih_plug_vizia::widgets::param_base::ParamWidgetBase;
use nih_plug_vizia::widgets::*;
use std::sync::Arc;

pub fn create_toggle_button<'a>(
    cx: &'a mut Context,
    label: &'static str,
    is_active: bool,
    callback: impl Fn(&mut EventContext) + 'static,
) -> Handle<'a, Button> {
    Button::new(cx, callback, |cx| Label::new(cx, label)).class(if is_active {
        "record-button-active"
    } else {
        "record-button"
    })
}

pub fn create_slider<'a, P>(
    cx: &'a mut Context,
    label: &'static str,
    map: impl Fn(&Arc<WhooshParams>) -> &P + Copy + 'static,
) -> Handle<'a, HStack>
where
    P: Param + 'static,
{
    HStack::new(cx, move |cx| {
        Label::new(cx, label).class("slider-label").text_wrap(false);

        ParamSlider::new(cx, WhooshData::params, move |p| map(p)).class("slider");

        let lens = ParamWidgetBase::make_lens(WhooshData::params, map, |p: &P| {
            p.normalized_value_to_string(p.unmodulated_normalized_value(), true)
        });
        Label::new(cx, lens).class("slider-value").hoverable(false);
    })
    .class("slider-row")
}
