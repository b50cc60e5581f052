use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            donation::{Donation, RecurringFrequency},
            error::PipelineError,
            gateway::GatewayName,
            money::Currency,
        },
        services::donations::CreateDonation,
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    },
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Debug, Deserialize)]
pub struct CreateDonationRequest {
    pub campaign_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    #[serde(default)]
    pub payment_gateway: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub donor_id: Option<Uuid>,
}

impl TryFrom<CreateDonationRequest> for CreateDonation {
    type Error = PipelineError;

    fn try_from(req: CreateDonationRequest) -> Result<Self, Self::Error> {
        let payment_gateway = req
            .payment_gateway
            .as_deref()
            .map(GatewayName::try_from)
            .transpose()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        Ok(Self {
            campaign_id: req.campaign_id,
            donor_id: req.donor_id,
            amount: req.amount,
            currency: Currency::try_from(req.currency.as_str())?,
            payment_method: req.payment_method,
            payment_gateway,
            anonymous: req.anonymous,
            recurring: req.recurring,
            frequency: req
                .frequency
                .as_deref()
                .map(RecurringFrequency::try_from)
                .transpose()?,
            notes: req.notes,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedDonationResponse {
    #[serde(flatten)]
    pub donation: Donation,
    pub client_secret: Option<String>,
    pub checkout_url: Option<String>,
}

pub async fn create_donation(
    State(state): State<AppState>,
    Json(req): Json<CreateDonationRequest>,
) -> Result<(StatusCode, Json<CreatedDonationResponse>), ApiError> {
    let created = state.donations.create(req.try_into()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedDonationResponse {
            donation: created.donation,
            client_secret: created.client_secret,
            checkout_url: created.checkout_url,
        }),
    ))
}

pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Donation>, ApiError> {
    Ok(Json(state.donations.get(id).await?))
}

pub async fn cancel_donation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Donation>, ApiError> {
    Ok(Json(state.donations.cancel(id).await?))
}

pub async fn request_refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Donation>, ApiError> {
    Ok(Json(state.donations.request_refund(id).await?))
}
