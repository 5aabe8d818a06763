use utoipa::OpenApi;

use crate::forms::{
    ArtworkForm, AttachmentForm, ClientForm, FeatureForm, FeaturesValueForm, LoginForm, NameForm, OfferForm,
    SearchForm, SelectTemplateForm, UserForm,
};
use crate::media::MediaKind;
use crate::models::{
    Artwork, ArtworkType, Attachment, Choice, Client, Feature, FeaturesValue, Offer, Record, SortKey, SortOrder,
    Status, Tag, User,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::artworks::view,
        crate::routes::artworks::feature_value,
        crate::routes::artworks::set_feature_value,
        crate::routes::artworks::add_tag,
        crate::routes::artworks::remove_tag,
        crate::routes::artworks::search,
        crate::routes::artworks::create_pdf,
        crate::routes::attachments::upload_file,
        crate::routes::attachments::view,
        crate::routes::attachments::update,
        crate::routes::attachments::delete,
        crate::routes::attachments::get_file,
        crate::routes::users::login,
        crate::routes::users::me,
        crate::routes::users::list,
        crate::routes::users::create,
        crate::routes::users::delete,
    ),
    components(schemas(
        Record, ArtworkType, Feature, FeaturesValue, Artwork, Tag, Client, Attachment, Status, Offer, User,
        Choice, SortKey, SortOrder, MediaKind,
        NameForm, FeatureForm, FeaturesValueForm, ArtworkForm, ClientForm, OfferForm, AttachmentForm,
        SelectTemplateForm, SearchForm, LoginForm, UserForm,
        crate::routes::artworks::ArtworkDetail,
        crate::routes::attachments::AttachmentView,
        crate::routes::users::TokenResponse,
    )),
    tags(
        (name = "artworks", description = "Artworks, feature values, tags and PDF sheets"),
        (name = "attachments", description = "Uploaded images and videos"),
        (name = "users", description = "Accounts and login"),
    )
)]
pub struct ApiDoc;
